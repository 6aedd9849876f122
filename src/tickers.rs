use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER_NAMES: [&str; 3] = ["ticker", "symbol", "tickers"];

#[derive(Debug, Error)]
pub enum TickerListError {
    #[error("ticker list not found at {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read ticker list {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse ticker list {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Normalizes a ticker string by trimming whitespace and uppercasing.
pub fn normalize_ticker_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().trim_matches('"').trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

pub fn load_tickers(path: &Path) -> Result<Vec<String>, TickerListError> {
    let contents = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            TickerListError::Missing {
                path: path.to_path_buf(),
            }
        } else {
            TickerListError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    parse_tickers(&contents).map_err(|source| TickerListError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Accepts one ticker per line or a CSV whose header names a `ticker`/`symbol` column.
pub fn parse_tickers(contents: &str) -> Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let mut column = 0usize;
    let mut seen = HashSet::new();
    let mut tickers = Vec::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if row == 0 {
            if let Some(idx) = record
                .iter()
                .position(|field| HEADER_NAMES.contains(&field.to_ascii_lowercase().as_str()))
            {
                column = idx;
                continue;
            }
        }

        let Some(symbol) = record.get(column).and_then(normalize_ticker_symbol) else {
            continue;
        };
        if seen.insert(symbol.clone()) {
            tickers.push(symbol);
        }
    }

    Ok(tickers)
}
