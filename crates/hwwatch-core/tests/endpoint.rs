//! Tests for the operator get/set endpoint

mod common;

use common::setup;
use hwwatch_core::error::{BackendError, EndpointError, ParseError};
use hwwatch_core::{AccessKind, ConfigEndpoint, InstallError, WatchStatus};

#[test]
fn test_get_reports_disabled_as_zero()
{
    let (manager, _backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);
    assert_eq!(endpoint.get(), "0x0\n");
    assert_eq!(endpoint.status_line(), "disabled");
}

#[test]
fn test_set_hex_and_decimal()
{
    let (manager, backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);

    endpoint.set("0xffff8880\n").unwrap();
    assert_eq!(endpoint.get(), "0xffff8880\n");
    assert_eq!(endpoint.status_line(), "armed 0xffff8880 (read+write)");

    endpoint.set("4096").unwrap();
    assert_eq!(endpoint.get(), "0x1000\n");
    assert_eq!(backend.active_count(), 2);
}

#[test]
fn test_set_zero_disables()
{
    let (manager, backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);
    endpoint.set("0x1000").unwrap();
    endpoint.set("0").unwrap();

    assert_eq!(endpoint.get(), "0x0\n");
    assert_eq!(backend.active_count(), 0);
}

#[test]
fn test_malformed_input_changes_nothing()
{
    let (manager, backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);
    endpoint.set("0x1000").unwrap();

    let err = endpoint.set("0x10g0").unwrap_err();
    assert!(matches!(err, EndpointError::Parse(ParseError::InvalidDigit { digit: 'g', .. })));
    assert!(matches!(endpoint.set(""), Err(EndpointError::Parse(ParseError::Empty))));

    assert_eq!(endpoint.get(), "0x1000\n");
    assert_eq!(backend.active_count(), 2);
}

#[test]
fn test_install_failure_is_reported_and_not_persisted()
{
    let (manager, backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);
    endpoint.set("0x1000").unwrap();

    backend.fail_next_register(AccessKind::Write, BackendError::new(libc::ENOSPC, "registers full"));
    let err = endpoint.set("0x2000").unwrap_err();
    assert!(matches!(err, EndpointError::Install(InstallError::Write { .. })));

    // The failed address is not reported as current.
    assert_eq!(endpoint.get(), "0x0\n");
    let status = endpoint.status_line();
    assert!(status.starts_with("disabled: 0x2000 requested but not armed"));
    assert!(status.contains("write watchpoint"));
    assert!(matches!(endpoint.manager().status(), WatchStatus::Faulted { .. }));
}

#[test]
fn test_clones_share_state()
{
    let (manager, _backend, _sink) = setup();
    let endpoint = ConfigEndpoint::new(manager);
    let other = endpoint.clone();
    endpoint.set("0x40").unwrap();
    assert_eq!(other.get(), "0x40\n");
}
