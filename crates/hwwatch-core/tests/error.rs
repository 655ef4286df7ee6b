//! Tests for error handling

use hwwatch_core::error::{BackendError, EndpointError, HwWatchError, HwWatchResult, InstallError, ParseError};
use hwwatch_core::{AccessKind, Address};

#[test]
fn test_backend_error_display()
{
    let error = BackendError::new(libc::ENOSPC, "no free debug register");
    let message = format!("{}", error);
    assert!(message.contains("no free debug register"));
    assert!(message.contains(&libc::ENOSPC.to_string()));
    assert_eq!(error.code(), libc::ENOSPC);
}

#[test]
fn test_install_error_accessors()
{
    let error = InstallError::Write {
        address: Address::new(0x1000),
        source: BackendError::new(libc::EBUSY, "busy"),
    };
    assert_eq!(error.kind(), AccessKind::Write);
    assert_eq!(error.address(), Address::new(0x1000));
    assert_eq!(error.code(), libc::EBUSY);

    let message = format!("{}", error);
    assert!(message.contains("write watchpoint"));
    assert!(message.contains("0x0000000000001000"));
}

#[test]
fn test_install_error_source_is_backend_error()
{
    use std::error::Error as _;

    let error = InstallError::Read {
        address: Address::new(0x1000),
        source: BackendError::new(libc::EINVAL, "bad type"),
    };
    let source = error.source().unwrap();
    assert!(source.to_string().contains("bad type"));
}

#[test]
fn test_endpoint_error_converts_to_umbrella()
{
    let parse: HwWatchError = EndpointError::Parse(ParseError::Empty).into();
    assert!(matches!(parse, HwWatchError::Parse(ParseError::Empty)));

    let install: HwWatchError = EndpointError::Install(InstallError::Read {
        address: Address::new(0x10),
        source: BackendError::new(libc::EINVAL, "x"),
    })
    .into();
    assert!(matches!(install, HwWatchError::Install(_)));
}

#[test]
fn test_parse_error_display()
{
    let error = ParseError::Overflow("0x1ffffffffffffffff".to_string());
    let message = format!("{}", error);
    assert!(message.contains("64 bits"));
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: HwWatchResult<()> = Ok(());
    let _error_result: HwWatchResult<()> = Err(HwWatchError::Unsupported("perf".to_string()));
}
