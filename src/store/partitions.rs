/// Key layout and encoding utilities for store partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> JobRecord (JSON)
/// - `indexes`: ix:{index}:{rank:020}:{job_id} -> IndexEntry (9 bytes)
/// - `metadata`: meta:{key} -> u64 (big-endian), tag:{tag} -> empty
///
/// Ranks are zero-padded so lexicographic key order equals insertion order
/// inside one index. Job IDs may contain `:`; they are always the last field.

pub const INDEX_ENTRY_LEN: usize = 9;

const PINNED_FLAG: u8 = 0b0000_0001;

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Decode a job key: job:{job_id} -> job_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Prefix shared by every job key
pub fn job_prefix() -> Vec<u8> {
    b"job:".to_vec()
}

/// Encode an index key: ix:{index}:{rank:020}:{job_id}
pub fn encode_index_key(index: &str, rank: u64, job_id: &str) -> Vec<u8> {
    format!("ix:{}:{:020}:{}", index, rank, job_id).into_bytes()
}

/// Decode an index key: ix:{index}:{rank:020}:{job_id} -> (index, rank, job_id)
pub fn decode_index_key(key: &[u8]) -> Option<(String, u64, String)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let mut parts = key_str.strip_prefix("ix:")?.splitn(3, ':');
    let index = parts.next()?.to_string();
    let rank = parts.next()?.parse().ok()?;
    let job_id = parts.next()?.to_string();
    if job_id.is_empty() {
        return None;
    }
    Some((index, rank, job_id))
}

/// Encode an index prefix for range scan: ix:{index}:
pub fn encode_index_prefix(index: &str) -> Vec<u8> {
    format!("ix:{}:", index).into_bytes()
}

/// Exclusive upper bound of an index range: ix:{index};
pub fn encode_index_upper_bound(index: &str) -> Vec<u8> {
    // ';' sorts directly after ':'
    format!("ix:{};", index).into_bytes()
}

/// Encode an index entry value: indexed_at (ms, big-endian) + flags
pub fn encode_index_entry(indexed_at_ms: i64, pinned: bool) -> Vec<u8> {
    let mut value = Vec::with_capacity(INDEX_ENTRY_LEN);
    value.extend_from_slice(&indexed_at_ms.to_be_bytes());
    value.push(if pinned { PINNED_FLAG } else { 0 });
    value
}

/// Decode an index entry value -> (indexed_at_ms, pinned)
pub fn decode_index_entry(value: &[u8]) -> Option<(i64, bool)> {
    if value.len() != INDEX_ENTRY_LEN {
        return None;
    }
    let indexed_at = i64::from_be_bytes(value[..8].try_into().ok()?);
    Some((indexed_at, value[8] & PINNED_FLAG != 0))
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

/// Encode a monitored tag key: tag:{tag}
pub fn encode_tag_key(tag: &str) -> Vec<u8> {
    format!("tag:{}", tag).into_bytes()
}

/// Decode a monitored tag key: tag:{tag} -> tag
pub fn decode_tag_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("tag:").map(String::from)
}

/// Prefix shared by every monitored tag key
pub fn tag_prefix() -> Vec<u8> {
    b"tag:".to_vec()
}

/// Encode a counter value stored in the metadata partition
pub fn encode_counter(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

/// Decode a counter value, treating malformed bytes as absent
pub fn decode_counter(value: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(value.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_encoding() {
        let key = encode_job_key("42");
        assert_eq!(key, b"job:42");
        assert_eq!(decode_job_key(&key).unwrap(), "42");
        assert!(decode_job_key(b"ix:recent").is_none());
    }

    #[test]
    fn test_index_key_encoding() {
        let key = encode_index_key("recent", 7, "job-7");
        assert_eq!(key, b"ix:recent:00000000000000000007:job-7");

        let (index, rank, job_id) = decode_index_key(&key).unwrap();
        assert_eq!(index, "recent");
        assert_eq!(rank, 7);
        assert_eq!(job_id, "job-7");
    }

    #[test]
    fn test_index_key_with_colon_in_id() {
        let key = encode_index_key("failed", 12, "redis:default:99");
        let (_, rank, job_id) = decode_index_key(&key).unwrap();
        assert_eq!(rank, 12);
        assert_eq!(job_id, "redis:default:99");
    }

    #[test]
    fn test_index_keys_sort_by_rank() {
        let low = encode_index_key("pending", 9, "zzz");
        let high = encode_index_key("pending", 10, "aaa");
        assert!(low < high);
        assert!(high < encode_index_upper_bound("pending"));
        assert!(encode_index_prefix("pending") < low);
    }

    #[test]
    fn test_index_entry_encoding() {
        let value = encode_index_entry(1_700_000_000_000, true);
        assert_eq!(value.len(), INDEX_ENTRY_LEN);
        assert_eq!(decode_index_entry(&value), Some((1_700_000_000_000, true)));

        let value = encode_index_entry(5, false);
        assert_eq!(decode_index_entry(&value), Some((5, false)));

        assert_eq!(decode_index_entry(b"short"), None);
    }

    #[test]
    fn test_meta_and_tag_keys() {
        assert_eq!(encode_meta_key("total_recent"), b"meta:total_recent");
        let key = encode_tag_key("billing");
        assert_eq!(key, b"tag:billing");
        assert_eq!(decode_tag_key(&key).unwrap(), "billing");
    }

    #[test]
    fn test_counter_encoding() {
        assert_eq!(decode_counter(&encode_counter(99)), Some(99));
        assert_eq!(decode_counter(b"bad"), None);
    }
}
