//! # Symbol Table
//!
//! Resolve captured stack frames to `symbol+0xoffset`.
//!
//! The table is loaded from `/proc/kallsyms`-format text:
//!
//! ```text
//! ffffffff81000000 T _text
//! ffffffffc0a01000 t nf_hook_slow	[nf_tables]
//! ```
//!
//! Rust symbols (the kernel's Rust code, or a user binary's table in the same
//! format) are demangled for display.
//!
//! Resolution runs on the consumer side of the event channel, never in the
//! trigger context. Lines whose address is zero (what unprivileged readers see
//! when `kptr_restrict` is set) carry no information and are skipped.

use std::fmt;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::HwWatchResult;
use crate::types::Address;

/// Default location of the kernel symbol table.
pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

#[derive(Debug, Clone, PartialEq, Eq)]
struct SymbolEntry
{
    address: Address,
    name: String,
    module: Option<String>,
}

/// A frame resolved against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSymbol<'a>
{
    /// Symbol name.
    pub name: &'a str,
    /// Distance from the symbol start.
    pub offset: u64,
    /// Owning module, `None` for the core image.
    pub module: Option<&'a str>,
}

impl fmt::Display for ResolvedSymbol<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{:#}+{:#x}", rustc_demangle::demangle(self.name), self.offset)?;
        if let Some(module) = self.module {
            write!(f, " [{module}]")?;
        }
        Ok(())
    }
}

/// Address-sorted symbol table.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable
{
    entries: Vec<SymbolEntry>,
}

impl SymbolTable
{
    /// Parse kallsyms-format text. Malformed lines are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self
    {
        let mut entries: Vec<SymbolEntry> = text.lines().filter_map(parse_line).collect();
        entries.sort_by_key(|entry| entry.address);
        Self { entries }
    }

    /// Load a table from a file.
    ///
    /// ## Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn load(path: impl AsRef<Path>) -> HwWatchResult<Self>
    {
        let path = path.as_ref();
        let table = Self::parse(&fs::read_to_string(path)?);
        debug!(path = %path.display(), symbols = table.len(), "symbol table loaded");
        Ok(table)
    }

    /// Nearest symbol at or below `address`.
    pub fn resolve(&self, address: Address) -> Option<ResolvedSymbol<'_>>
    {
        let index = self.entries.partition_point(|entry| entry.address <= address);
        let entry = self.entries.get(index.checked_sub(1)?)?;
        Some(ResolvedSymbol {
            name: &entry.name,
            offset: address.offset_from(entry.address)?,
            module: entry.module.as_deref(),
        })
    }

    /// Number of symbols.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// `true` if nothing usable was loaded.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }
}

fn parse_line(line: &str) -> Option<SymbolEntry>
{
    let mut fields = line.split_whitespace();
    let address = u64::from_str_radix(fields.next()?, 16).ok()?;
    let _kind = fields.next()?;
    let name = fields.next()?;
    let module = fields
        .next()
        .map(|m| m.trim_start_matches('[').trim_end_matches(']').to_string());

    (address != 0).then(|| SymbolEntry {
        address: Address::new(address),
        name: name.to_string(),
        module,
    })
}

#[cfg(test)]
mod tests
{
    use super::*;

    const SAMPLE: &str = "\
ffffffff81000000 T _text
ffffffff81001000 T do_one_initcall
ffffffff81002000 t helper_fn
ffffffffc0a01000 t nf_hook_slow\t[nf_tables]
ffffffffc0b00000 T _ZN4core9panicking5panic17h0123456789abcdefE\t[rust_mod]
0000000000000000 T hidden_symbol
garbage line
";

    #[test]
    fn test_parse_skips_zero_and_malformed_lines()
    {
        let table = SymbolTable::parse(SAMPLE);
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_resolve_nearest_symbol_below()
    {
        let table = SymbolTable::parse(SAMPLE);
        let resolved = table.resolve(Address::new(0xffff_ffff_8100_1010)).unwrap();
        assert_eq!(resolved.name, "do_one_initcall");
        assert_eq!(resolved.offset, 0x10);
        assert_eq!(resolved.to_string(), "do_one_initcall+0x10");
    }

    #[test]
    fn test_resolve_exact_and_module()
    {
        let table = SymbolTable::parse(SAMPLE);
        let resolved = table.resolve(Address::new(0xffff_ffff_c0a0_1000)).unwrap();
        assert_eq!(resolved.offset, 0);
        assert_eq!(resolved.module, Some("nf_tables"));
        assert_eq!(resolved.to_string(), "nf_hook_slow+0x0 [nf_tables]");
    }

    #[test]
    fn test_rust_symbols_are_demangled()
    {
        let table = SymbolTable::parse(SAMPLE);
        let resolved = table.resolve(Address::new(0xffff_ffff_c0b0_0004)).unwrap();
        assert_eq!(resolved.to_string(), "core::panicking::panic+0x4 [rust_mod]");
    }

    #[test]
    fn test_resolve_below_first_symbol()
    {
        let table = SymbolTable::parse(SAMPLE);
        assert!(table.resolve(Address::new(0x1000)).is_none());
        assert!(SymbolTable::default().resolve(Address::new(0x1000)).is_none());
    }
}
