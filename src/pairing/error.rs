use thiserror::Error;

#[derive(Error, Debug)]
pub enum PairingError {
    #[error("exhausted pairing code capacity")]
    CapacityExhausted,
}

pub type PairingResult<T> = Result<T, PairingError>;
