use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
