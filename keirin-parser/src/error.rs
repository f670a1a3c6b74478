use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid selector: {0}")]
    Selector(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

pub(crate) fn selector(css: &str) -> ParseResult<scraper::Selector> {
    scraper::Selector::parse(css).map_err(|e| ParseError::Selector(e.to_string()))
}
