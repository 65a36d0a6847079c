use std::collections::BTreeMap;

use crate::error::DescriptorError;

/// Splits long values in `fields` into `key00`, `key01`, ... chunks so that
/// every `key=value` entry fits in an mDNS TXT record of at most
/// `record_max` bytes. Short values pass through unchanged.
///
/// Grounded on the Python `chunkable_values.chunk` this codec replaces: a
/// long value stored under key `k` becomes keys `k00..kNN` whose values
/// concatenate (in sorted order) back to the original.
pub fn chunk(fields: &BTreeMap<String, String>, record_max: usize) -> Result<BTreeMap<String, String>, DescriptorError> {
    let mut out = BTreeMap::new();
    for (key, value) in fields {
        // +1 accounts for the '=' joining key and value in the TXT entry.
        if key.len() + value.len() + 1 <= record_max {
            out.insert(key.clone(), value.clone());
            continue;
        }

        let chunk_size = record_max.checked_sub(key.len() + 3);
        let chunk_size = match chunk_size {
            Some(n) if n >= 1 => n,
            _ => {
                return Err(DescriptorError::DescriptorTooLarge {
                    key: key.clone(),
                    record_max,
                })
            },
        };

        let mut remaining = value.as_str();
        let mut index = 0u32;
        while !remaining.is_empty() {
            let take = remaining.len().min(chunk_size);
            let (piece, rest) = remaining.split_at(take);
            out.insert(format!("{key}{index:02}"), piece.to_string());
            remaining = rest;
            index += 1;
        }
    }
    Ok(out)
}

/// Reassembles chunks produced by [`chunk`]. Keys whose last two characters
/// do not parse as a chunk index are passed through unchanged.
pub fn unchunk(fields: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in fields {
        if key.len() > 2 {
            let (prefix, suffix) = key.split_at(key.len() - 2);
            if suffix.chars().all(|c| c.is_ascii_digit()) {
                out.entry(prefix.to_string()).or_default().push_str(value);
                continue;
            }
        }
        out.insert(key.clone(), value.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn short_values_pass_through() {
        let fields = map(&[("a", "1"), ("b", "0123456789")]);
        assert_eq!(chunk(&fields, 10).unwrap(), map(&[("a", "1"), ("b", "0123456789")]));
    }

    #[test]
    fn long_values_are_chunked() {
        let fields = map(&[("a", "1"), ("b", "0123456789")]);
        let chunked = chunk(&fields, 7).unwrap();
        assert_eq!(
            chunked,
            map(&[("a", "1"), ("b00", "012"), ("b01", "345"), ("b02", "678"), ("b03", "9")])
        );
    }

    #[test]
    fn chunk_then_unchunk_round_trips() {
        let fields = map(&[("a", "1"), ("b", "0123456789")]);
        let chunked = chunk(&fields, 5).unwrap();
        assert_eq!(unchunk(&chunked), fields);
    }

    #[test]
    fn double_chunk_round_trips() {
        let fields = map(&[("a", "1"), ("b", "0123456789")]);
        let once = chunk(&fields, 9).unwrap();
        let twice = chunk(&once, 8).unwrap();
        assert_eq!(unchunk(&unchunk(&twice)), fields);
    }

    #[test]
    fn rejects_record_size_with_no_room() {
        let fields = map(&[("b", "0123456789")]);
        let err = chunk(&fields, 4).unwrap_err();
        assert!(matches!(err, DescriptorError::DescriptorTooLarge { .. }));
    }
}
