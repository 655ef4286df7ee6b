//! Decoding `PERF_RECORD_SAMPLE` and `PERF_RECORD_LOST` records.
//!
//! With `SAMPLE_TYPE` a sample body is laid out as
//!
//! ```text
//! u64 ip; u32 pid, tid; u64 time; u64 addr; u32 cpu, res; u64 nr; u64 ips[nr];
//! ```
//!
//! A lost record is `u64 id; u64 lost;`.

use super::ffi::{PERF_CONTEXT_MAX, PERF_RECORD_LOST, PERF_RECORD_SAMPLE};
use crate::backend::RawAccess;
use crate::types::{Address, StackTrace};

struct Reader<'a>
{
    bytes: &'a [u8],
}

impl<'a> Reader<'a>
{
    fn take(&mut self, len: usize) -> Option<&'a [u8]>
    {
        if self.bytes.len() < len {
            return None;
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some(head)
    }

    fn u16(&mut self) -> Option<u16>
    {
        self.take(2)?.try_into().ok().map(u16::from_ne_bytes)
    }

    fn u32(&mut self) -> Option<u32>
    {
        self.take(4)?.try_into().ok().map(u32::from_ne_bytes)
    }

    fn u64(&mut self) -> Option<u64>
    {
        self.take(8)?.try_into().ok().map(u64::from_ne_bytes)
    }
}

/// A ring record the poller cares about.
#[derive(Debug, PartialEq, Eq)]
pub enum Record
{
    /// One access to the watched address.
    Sample(RawAccess),
    /// The kernel dropped this many samples because the ring was full.
    Lost(u64),
}

/// Decode one ring record. Other record types (throttle, ...) and truncated
/// records yield `None`.
pub fn decode_record(record: &[u8]) -> Option<Record>
{
    let mut reader = Reader { bytes: record };
    let kind = reader.u32()?;
    let _misc = reader.u16()?;
    let _size = reader.u16()?;
    match kind {
        PERF_RECORD_SAMPLE => decode_sample(&mut reader).map(Record::Sample),
        PERF_RECORD_LOST => {
            let _id = reader.u64()?;
            reader.u64().map(Record::Lost)
        }
        _ => None,
    }
}

fn decode_sample(reader: &mut Reader<'_>) -> Option<RawAccess>
{
    let ip = reader.u64()?;
    let pid = reader.u32()?;
    let tid = reader.u32()?;
    let time = reader.u64()?;
    let addr = reader.u64()?;
    let cpu = reader.u32()?;
    let _res = reader.u32()?;
    let nr = reader.u64()?;

    let mut stack = StackTrace::new();
    for _ in 0..nr {
        let frame = reader.u64()?;
        if frame >= PERF_CONTEXT_MAX {
            continue;
        }
        if !stack.push(Address::new(frame)) {
            break;
        }
    }

    Some(RawAccess {
        address: Address::new(addr),
        ip: Address::new(ip),
        cpu: Some(cpu),
        pid: Some(pid),
        tid: Some(tid),
        timestamp_ns: time,
        stack,
    })
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::types::MAX_STACK_FRAMES;

    const PERF_CONTEXT_KERNEL: u64 = (-128_i64) as u64;

    fn sample(frames: &[u64]) -> Vec<u8>
    {
        let mut body = Vec::new();
        body.extend_from_slice(&0xffff_ffff_8100_0010_u64.to_ne_bytes()); // ip
        body.extend_from_slice(&42_u32.to_ne_bytes()); // pid
        body.extend_from_slice(&43_u32.to_ne_bytes()); // tid
        body.extend_from_slice(&1_000_u64.to_ne_bytes()); // time
        body.extend_from_slice(&0x1000_u64.to_ne_bytes()); // addr
        body.extend_from_slice(&2_u32.to_ne_bytes()); // cpu
        body.extend_from_slice(&0_u32.to_ne_bytes()); // res
        body.extend_from_slice(&(frames.len() as u64).to_ne_bytes());
        for frame in frames {
            body.extend_from_slice(&frame.to_ne_bytes());
        }

        let mut record = Vec::new();
        record.extend_from_slice(&PERF_RECORD_SAMPLE.to_ne_bytes());
        record.extend_from_slice(&0_u16.to_ne_bytes());
        record.extend_from_slice(&((body.len() + 8) as u16).to_ne_bytes());
        record.extend_from_slice(&body);
        record
    }

    #[test]
    fn test_decode_sample_fields()
    {
        let access = decode_access(&sample(&[PERF_CONTEXT_KERNEL, 0xaaaa, 0xbbbb])).unwrap();
        assert_eq!(access.address, Address::new(0x1000));
        assert_eq!(access.ip, Address::new(0xffff_ffff_8100_0010));
        assert_eq!(access.pid, Some(42));
        assert_eq!(access.tid, Some(43));
        assert_eq!(access.cpu, Some(2));
        assert_eq!(access.timestamp_ns, 1_000);
        assert_eq!(access.stack.frames(), &[Address::new(0xaaaa), Address::new(0xbbbb)]);
    }

    #[test]
    fn test_decode_truncates_deep_stacks()
    {
        let frames: Vec<u64> = (1..=40).collect();
        let access = decode_access(&sample(&frames)).unwrap();
        assert_eq!(access.stack.len(), MAX_STACK_FRAMES);
        assert!(access.stack.is_truncated());
    }

    fn decode_access(record: &[u8]) -> Option<RawAccess>
    {
        match decode_record(record)? {
            Record::Sample(access) => Some(access),
            Record::Lost(_) => None,
        }
    }

    #[test]
    fn test_decode_lost_record()
    {
        let mut lost = Vec::new();
        lost.extend_from_slice(&PERF_RECORD_LOST.to_ne_bytes());
        lost.extend_from_slice(&0_u16.to_ne_bytes());
        lost.extend_from_slice(&24_u16.to_ne_bytes());
        lost.extend_from_slice(&7_u64.to_ne_bytes()); // id
        lost.extend_from_slice(&5_u64.to_ne_bytes()); // lost
        assert_eq!(decode_record(&lost), Some(Record::Lost(5)));
        assert_eq!(decode_record(&lost[..16]), None);
    }

    #[test]
    fn test_decode_ignores_other_records_and_short_input()
    {
        let mut throttle = sample(&[]);
        throttle[..4].copy_from_slice(&5_u32.to_ne_bytes()); // PERF_RECORD_THROTTLE
        assert!(decode_record(&throttle).is_none());

        let full = sample(&[0xaaaa]);
        assert!(decode_record(&full[..20]).is_none());
    }
}
