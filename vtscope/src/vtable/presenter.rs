//! Entry symbolization and summaries
//!
//! Summaries follow the layout debuggers use for function pointers:
//!
//! ```text
//! (double ()) [0] = 0x0000555555555a10 shapes`Rectangle::Area() at shapes.cpp:14
//! [4] = 0x00007ffff7e4c210
//! ```
//!
//! The second form is used when the pointer does not resolve to a function.

use std::fmt::Write as _;

use super::model::VtableEntry;
use crate::domain::Address;
use crate::symbolization::{ResolvedFunction, SymbolResolver};

/// Resolve an entry's function pointer and rebuild its summary
///
/// An unresolvable pointer is not an error: the entry keeps its raw value and
/// gets an address-only summary.
#[must_use]
pub fn describe<S: SymbolResolver + ?Sized>(symbols: &S, entry: VtableEntry) -> VtableEntry {
    let function = symbols.resolve_function(entry.raw_value);
    let summary = format_summary(entry.index, entry.raw_value, function.as_ref());
    VtableEntry { summary, function, ..entry }
}

/// Render one entry line
#[must_use]
pub fn format_summary(
    index: usize,
    raw_value: Address,
    function: Option<&ResolvedFunction>,
) -> String {
    let mut out = String::new();
    if let Some(function_type) = function.and_then(|f| f.function_type.as_deref()) {
        let _ = write!(out, "({function_type}) ");
    }
    let _ = write!(out, "[{index}] = {raw_value}");

    if let Some(function) = function {
        let _ = write!(out, " {}`{}", function.module, function.display_name);
        if let Some(file) = function.file_name() {
            let _ = write!(out, " at {file}");
            if let Some(line) = function.line {
                let _ = write!(out, ":{line}");
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolization::DataSymbol;

    struct OneFunction;

    impl SymbolResolver for OneFunction {
        fn resolve_function(&self, address: Address) -> Option<ResolvedFunction> {
            (address == Address(0x1a10)).then(|| ResolvedFunction {
                function_type: Some("double ()".to_string()),
                display_name: "Rectangle::Area()".to_string(),
                file: Some("/work/demo/shapes.cpp".to_string()),
                line: Some(14),
                module: "a.out".to_string(),
            })
        }

        fn resolve_data_symbol(&self, _address: Address) -> Option<DataSymbol> {
            None
        }
    }

    #[test]
    fn test_resolved_summary() {
        let entry = describe(&OneFunction, VtableEntry::unresolved(0, Address(0x1a10)));
        assert_eq!(
            entry.summary,
            "(double ()) [0] = 0x0000000000001a10 a.out`Rectangle::Area() at shapes.cpp:14"
        );
        assert_eq!(entry.function_type(), Some("double ()"));
        assert_eq!(entry.raw_value, Address(0x1a10));
    }

    #[test]
    fn test_unresolved_entry_is_kept() {
        let entry = describe(&OneFunction, VtableEntry::unresolved(3, Address(0xfeed)));
        assert_eq!(entry.summary, "[3] = 0x000000000000feed");
        assert!(entry.function.is_none());
        assert_eq!(entry.index, 3);
    }

    #[test]
    fn test_summary_without_debug_info() {
        let function = ResolvedFunction {
            function_type: None,
            display_name: "Shape::~Shape()".to_string(),
            file: None,
            line: None,
            module: "libshapes.so".to_string(),
        };
        assert_eq!(
            format_summary(2, Address(0x2000), Some(&function)),
            "[2] = 0x0000000000002000 libshapes.so`Shape::~Shape()"
        );
    }
}
