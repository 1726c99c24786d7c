//! Proof string parsing and the canonical signable message.

use super::{ParseError, Proof, ProofField};

/// Query parameter carrying a delegated-spender proof.
pub const QUERY_DELEGATED: &str = "arkauth";

/// Query parameter carrying a direct-client proof.
pub const QUERY_DIRECT: &str = "arkcontract";

/// The message signatures are computed over: `<contract_id>:<counter>`.
#[must_use]
pub fn canonical_message(contract_id: u64, counter: i64) -> String {
    format!("{contract_id}:{counter}")
}

/// Parse `<contract_id>:<nonce>:<signature hex>`.
///
/// Trailing fields may be omitted; a bare contract id names a contract
/// without proving anything, which only open contracts accept.
///
/// # Errors
///
/// Returns a [`ParseError`] naming the first field that failed.
pub fn parse_delegated(raw: &str) -> Result<Proof, ParseError> {
    let (contract_id, nonce, signature) = split(raw, ProofField::Nonce)?;
    Ok(Proof::Delegated {
        contract_id,
        nonce,
        signature,
    })
}

/// Parse `<contract_id>:<timestamp>:<signature hex>`.
///
/// # Errors
///
/// Returns a [`ParseError`] naming the first field that failed.
pub fn parse_direct(raw: &str) -> Result<Proof, ParseError> {
    let (contract_id, timestamp, signature) = split(raw, ProofField::Timestamp)?;
    Ok(Proof::Direct {
        contract_id,
        timestamp,
        signature,
    })
}

/// Find a proof among decoded query pairs.
///
/// The delegated parameter wins when both are present. Only the first
/// occurrence of a parameter is considered.
///
/// # Errors
///
/// Returns a [`ParseError`] if the chosen parameter is malformed.
pub fn from_query<'a, I>(pairs: I) -> Result<Option<Proof>, ParseError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut delegated = None;
    let mut direct = None;
    for (key, value) in pairs {
        match key {
            QUERY_DELEGATED if delegated.is_none() => delegated = Some(value),
            QUERY_DIRECT if direct.is_none() => direct = Some(value),
            _ => {}
        }
    }

    match (delegated, direct) {
        (Some(raw), _) => parse_delegated(raw).map(Some),
        (None, Some(raw)) => parse_direct(raw).map(Some),
        (None, None) => Ok(None),
    }
}

fn split(raw: &str, counter_field: ProofField) -> Result<(u64, i64, Vec<u8>), ParseError> {
    let mut parts = raw.splitn(3, ':');

    let contract_id = parts
        .next()
        .unwrap_or_default()
        .parse::<u64>()
        .map_err(|e| ParseError::new(ProofField::ContractId, e))?;

    let counter = match parts.next() {
        Some(part) => part
            .parse::<i64>()
            .map_err(|e| ParseError::new(counter_field, e))?,
        None => 0,
    };

    let signature = match parts.next() {
        Some(part) => hex::decode(part).map_err(|e| ParseError::new(ProofField::Signature, e))?,
        None => Vec::new(),
    };

    Ok((contract_id, counter, signature))
}
