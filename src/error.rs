//! Unified error types for the arbitrage scanner.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the crate.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Exchange feed error.
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),

    /// Position ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Exchange feed errors (streaming and polled).
#[derive(Error, Debug)]
pub enum FeedError {
    /// A live adapter was configured without the credentials it needs.
    #[error("{venue}: missing credential {field}")]
    MissingCredentials {
        /// Venue name.
        venue: String,
        /// Missing configuration field.
        field: String,
    },

    /// No adapter exists for this venue name.
    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    /// Venue does not list the symbol (under the spelling tried).
    #[error("{venue}: symbol {symbol} not found")]
    SymbolNotFound {
        /// Venue name.
        venue: String,
        /// Symbol spelling that was rejected.
        symbol: String,
    },

    /// Venue rejected the requested depth limit.
    #[error("{venue}: depth limit {limit} rejected")]
    DepthRejected {
        /// Venue name.
        venue: String,
        /// Rejected limit.
        limit: usize,
    },

    /// Request reached the venue but failed.
    #[error("{venue}: request failed: {reason}")]
    RequestFailed {
        /// Venue name.
        venue: String,
        /// Reason for failure.
        reason: String,
    },

    /// Response could not be parsed.
    #[error("failed to parse venue response: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Order book walking errors.
#[derive(Error, Debug)]
pub enum ArbitrageError {
    /// Not enough liquidity in the order book.
    #[error("insufficient liquidity: need {required}, available {available}")]
    InsufficientLiquidity {
        /// Required size.
        required: Decimal,
        /// Available size.
        available: Decimal,
    },

    /// Invalid order size.
    #[error("invalid order size: {0}")]
    InvalidSize(Decimal),
}

/// Position ledger errors.
#[derive(Error, Debug, PartialEq)]
pub enum LedgerError {
    /// An enter decision arrived while a position is open.
    #[error("position already open for {0}")]
    PositionAlreadyOpen(String),

    /// A reduce/exit decision arrived with nothing open.
    #[error("no open position for {0}")]
    NoOpenPosition(String),

    /// Requested notional rounds below the configured minimum.
    #[error("notional {notional} below minimum {minimum}")]
    BelowMinimumNotional {
        /// Rounded notional.
        notional: Decimal,
        /// Configured minimum.
        minimum: Decimal,
    },

    /// Decision is missing a field its action requires.
    #[error("decision missing {0}")]
    MissingField(&'static str),

    /// Reduce fraction outside (0, 1].
    #[error("invalid reduce fraction: {0}")]
    InvalidFraction(Decimal),

    /// Price must be positive.
    #[error("invalid price: {0}")]
    InvalidPrice(Decimal),
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Frame could not be decoded.
    #[error("failed to decode frame: {0}")]
    Decode(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
