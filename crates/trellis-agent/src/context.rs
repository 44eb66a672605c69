use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{ChatMessage, Role};

/// Bounded view of a transcript, cut at the `n`-th message with role `marker`.
///
/// With `from_end` the markers are counted from the back and the suffix that
/// starts at the chosen marker is returned. Otherwise markers are counted from
/// the front and the prefix that ends with the chosen marker is returned.
/// When fewer than `n` markers exist the whole transcript comes back.
///
/// The result borrows from `transcript`; nothing is removed from the state.
pub fn trim_from(
    transcript: &[ChatMessage],
    marker: Role,
    n: usize,
    from_end: bool,
) -> Result<&[ChatMessage]> {
    if n == 0 {
        return Err(TrellisError::InvalidTrim(
            "marker count must be at least 1".to_string(),
        ));
    }

    let mut positions = transcript
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == marker)
        .map(|(i, _)| i);

    let cut = if from_end {
        positions.rev().nth(n - 1).map(|i| &transcript[i..])
    } else {
        positions.nth(n - 1).map(|i| &transcript[..=i])
    };

    Ok(cut.unwrap_or(transcript))
}
