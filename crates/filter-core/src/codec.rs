//! Encoding and decoding for the two persisted shapes this crate owns:
//! filter records (textual key/value form, for readability in the `filters`
//! table) and stats blobs (compact self-describing binary, since these are
//! written far more often and can get large).

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Filter, FilterStats};

/// Encode a [`Filter`]'s persisted fields (id, name, regex, client_host) as
/// `key=value` lines. Stats are persisted separately, in the `filter_stats`
/// table, so they are not part of this record.
pub fn encode_filter(filter: &Filter) -> Vec<u8> {
    let mut out = String::new();
    out.push_str("id=");
    out.push_str(&filter.id.to_string());
    out.push('\n');
    out.push_str("name=");
    out.push_str(&filter.name);
    out.push('\n');
    out.push_str("client_host=");
    out.push_str(&filter.client_host);
    out.push('\n');
    // The regex is last and unescaped: it is the only field that may itself
    // contain `=` or newlines are not expected in practice, but we take the
    // rest of the buffer for it to be safe against `=` inside the pattern.
    out.push_str("regex=");
    out.push_str(&filter.regex);
    out.into_bytes()
}

/// Decode a filter record previously written by [`encode_filter`].
pub fn decode_filter(bytes: &[u8]) -> Result<Filter> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Decode(format!("filter record is not utf-8: {e}")))?;

    let mut id = None;
    let mut name = None;
    let mut client_host = None;
    let mut regex = None;

    for (i, line) in text.splitn(4, '\n').enumerate() {
        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::Decode(format!("malformed filter record line {i}")));
        };
        match key {
            "id" => id = Some(value),
            "name" => name = Some(value),
            "client_host" => client_host = Some(value),
            "regex" => regex = Some(value),
            other => return Err(Error::Decode(format!("unknown filter record key {other:?}"))),
        }
    }

    let id = id.ok_or_else(|| Error::Decode("filter record missing id".into()))?;
    let id = Uuid::parse_str(id).map_err(|e| Error::Decode(format!("invalid filter id: {e}")))?;
    let name = name.ok_or_else(|| Error::Decode("filter record missing name".into()))?.to_string();
    let client_host = client_host.unwrap_or_default().to_string();
    let regex = regex.ok_or_else(|| Error::Decode("filter record missing regex".into()))?.to_string();

    Ok(Filter { id, name, regex, client_host, stats: FilterStats::default() })
}

macro_rules! check_len {
    ($buf:ident, $len:expr, $what:literal) => {
        if $buf.remaining() < $len {
            return Err(Error::Decode(format!(
                "truncated stats blob: expected {} more bytes for {}",
                $len, $what
            )));
        }
    };
}

/// Encode a [`FilterStats`] container into the compact binary form stored
/// in the `filter_stats` table.
///
/// Layout: `u32` metric count, then per metric: `u32` metric id, `u32`
/// bucket count, then per bucket: `i64` bucket start, `i64` counter.
pub fn encode_stats(stats: &FilterStats) -> Vec<u8> {
    let mut buf = Vec::with_capacity(serialized_size(stats));
    buf.put_u32(stats.metrics.len() as u32);
    for (metric, series) in &stats.metrics {
        buf.put_u32(*metric);
        buf.put_u32(series.len() as u32);
        for (bucket, counter) in series {
            buf.put_i64(*bucket);
            buf.put_i64(*counter);
        }
    }
    buf
}

fn serialized_size(stats: &FilterStats) -> usize {
    4 + stats.metrics.values().fold(0, |acc, series| acc + 4 + 4 + series.len() * 16)
}

/// Decode a stats blob previously written by [`encode_stats`].
pub fn decode_stats(bytes: &[u8]) -> Result<FilterStats> {
    let mut buf = bytes;
    check_len!(buf, 4, "metric count");
    let metric_count = buf.get_u32();

    let mut stats = FilterStats::default();
    for _ in 0..metric_count {
        check_len!(buf, 4, "metric id");
        let metric = buf.get_u32();

        check_len!(buf, 4, "bucket count");
        let bucket_count = buf.get_u32();

        let series = stats.metrics.entry(metric).or_default();
        for _ in 0..bucket_count {
            check_len!(buf, 16, "bucket entry");
            let bucket = buf.get_i64();
            let counter = buf.get_i64();
            series.insert(bucket, counter);
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_record_roundtrips() {
        let filter = Filter {
            id: Uuid::new_v4(),
            name: "errors".to_string(),
            regex: "ERR.*=fatal".to_string(),
            client_host: "10.0.0.1:5000".to_string(),
            stats: FilterStats::default(),
        };

        let encoded = encode_filter(&filter);
        let decoded = decode_filter(&encoded).expect("decode");

        assert_eq!(decoded.id, filter.id);
        assert_eq!(decoded.name, filter.name);
        assert_eq!(decoded.regex, filter.regex);
        assert_eq!(decoded.client_host, filter.client_host);
    }

    #[test]
    fn stats_blob_roundtrips() {
        let mut stats = FilterStats::default();
        stats.add(1, 1000, 5);
        stats.add(1, 2000, -3);
        stats.add(2, 1000, 1);

        let encoded = encode_stats(&stats);
        assert_eq!(encoded.len(), serialized_size(&stats));
        let decoded = decode_stats(&encoded).expect("decode");

        assert_eq!(decoded, stats);
    }

    #[test]
    fn decode_stats_rejects_truncated_input() {
        let mut stats = FilterStats::default();
        stats.add(1, 1000, 5);
        let mut encoded = encode_stats(&stats);
        encoded.truncate(encoded.len() - 1);

        assert!(decode_stats(&encoded).is_err());
    }

    #[test]
    fn decode_filter_rejects_non_utf8() {
        assert!(decode_filter(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
