//! Tests for backend-agnostic types

use hwwatch_core::types::{AccessKind, Address, StackTrace, WatchRequest, MAX_STACK_FRAMES, WATCH_WIDTH};

#[test]
fn test_address_null_sentinel()
{
    assert!(Address::ZERO.is_null());
    assert!(Address::default().is_null());
    assert!(!Address::new(1).is_null());
}

#[test]
fn test_address_formatting()
{
    let addr = Address::from(0x1000);
    assert_eq!(format!("{addr}"), "0x0000000000001000");
    assert_eq!(format!("{addr:#x}"), "0x1000");
    assert_eq!(format!("{:#x}", Address::ZERO), "0x0");
}

#[test]
fn test_address_conversions()
{
    let addr = Address::from(0xdead_u64);
    let value: u64 = addr.into();
    assert_eq!(value, 0xdead);
    assert_eq!(Address::new(0x1010).offset_from(Address::new(0x1000)), Some(0x10));
    assert_eq!(Address::new(0x1000).offset_from(Address::new(0x1010)), None);
}

#[test]
fn test_access_kind_labels()
{
    assert_eq!(AccessKind::Read.to_string(), "READ");
    assert_eq!(AccessKind::Write.to_string(), "WRITE");
}

#[test]
fn test_watch_request_uses_minimum_width()
{
    let request = WatchRequest::new(AccessKind::Read, Address::new(0x1000));
    assert_eq!(request.length, WATCH_WIDTH);
    assert_eq!(WATCH_WIDTH, 1);
}

#[test]
fn test_watch_request_matches_exact_byte_and_kind()
{
    let request = WatchRequest::new(AccessKind::Write, Address::new(0x1000));
    assert!(request.matches(AccessKind::Write, Address::new(0x1000)));
    assert!(!request.matches(AccessKind::Read, Address::new(0x1000)));
    assert!(!request.matches(AccessKind::Write, Address::new(0x1001)));
    assert!(!request.matches(AccessKind::Write, Address::new(0x0fff)));
}

#[test]
fn test_stack_trace_truncates()
{
    let trace = StackTrace::from_frames(0..(MAX_STACK_FRAMES as u64 + 5));
    assert_eq!(trace.len(), MAX_STACK_FRAMES);
    assert!(trace.is_truncated());

    let short = StackTrace::from_frames([1, 2, 3]);
    assert_eq!(short.frames(), &[Address::new(1), Address::new(2), Address::new(3)]);
    assert!(!short.is_truncated());
}

#[test]
fn test_stack_trace_empty()
{
    let trace = StackTrace::new();
    assert!(trace.is_empty());
    assert!(!trace.is_truncated());
}
