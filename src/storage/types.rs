#[derive(Debug, Clone, Copy, Default)]
pub struct SessionUsage {
    pub bytes: u64,
    pub file_count: u64,
}
