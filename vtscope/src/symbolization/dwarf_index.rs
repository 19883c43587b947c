//! DWARF function type and class index
//!
//! addr2line answers "which function is at this address and on which line",
//! but not "what is its type" or "does this class have a vtable". This index
//! walks every compilation unit once with gimli and records:
//!
//! - each `DW_TAG_subprogram` address range with its rendered type
//!   (`double ()`, `void (int, const char *)`), following
//!   `DW_AT_specification` / `DW_AT_abstract_origin` back to the in-class
//!   declaration for the return type;
//! - each defined class or struct by qualified name, with a polymorphism flag.
//!
//! Only same-unit references (`DW_FORM_ref*`) are followed; cross-unit
//! references render as `?`.

use gimli::{AttributeValue, DebuggingInformationEntry, Reader, Unit, UnitOffset};
use log::debug;
use std::collections::HashMap;

use crate::vtable::TypeDescriptor;

/// Bound on reference chains (typedef → const → pointer → ...)
const MAX_DEPTH: usize = 16;

#[derive(Debug, Clone)]
struct FunctionRange {
    low: u64,
    high: u64,
    signature: String,
}

/// Address-ordered function types plus class descriptors of one ELF file
#[derive(Debug, Default)]
pub struct DwarfIndex {
    functions: Vec<FunctionRange>,
    types: HashMap<String, TypeDescriptor>,
}

impl DwarfIndex {
    /// Walk every unit of `dwarf`
    ///
    /// # Errors
    /// Returns an error if the DWARF data is malformed
    pub fn build<R: Reader>(dwarf: &gimli::Dwarf<R>) -> gimli::Result<Self> {
        let mut index = Self::default();

        let mut units = dwarf.units();
        while let Some(header) = units.next()? {
            let unit = dwarf.unit(header)?;
            index.index_unit(dwarf, &unit)?;
        }

        index.functions.sort_by_key(|f| f.low);
        debug!(
            "DWARF index: {} function ranges, {} class types",
            index.functions.len(),
            index.types.len()
        );
        Ok(index)
    }

    /// Rendered type of the function whose code covers `addr` (file address)
    #[must_use]
    pub fn function_type(&self, addr: u64) -> Option<&str> {
        let idx = self.functions.partition_point(|f| f.low <= addr);
        // Subprogram ranges do not overlap, so only the closest start can match
        self.functions[..idx].last().filter(|f| addr < f.high).map(|f| f.signature.as_str())
    }

    /// Class or struct by qualified name (`Shape`, `geo::Circle`)
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    #[must_use]
    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    #[must_use]
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    fn index_unit<R: Reader>(
        &mut self,
        dwarf: &gimli::Dwarf<R>,
        unit: &Unit<R>,
    ) -> gimli::Result<()> {
        // Enclosing namespaces/classes as (depth, name)
        let mut scope: Vec<(isize, String)> = Vec::new();
        let mut depth: isize = 0;

        let mut entries = unit.entries();
        while let Some((delta, entry)) = entries.next_dfs()? {
            depth += delta;
            while scope.last().is_some_and(|(d, _)| *d >= depth) {
                scope.pop();
            }

            match entry.tag() {
                gimli::DW_TAG_namespace
                | gimli::DW_TAG_class_type
                | gimli::DW_TAG_structure_type
                | gimli::DW_TAG_union_type => {
                    let name = attr_name(dwarf, unit, entry)?;
                    let is_class = matches!(
                        entry.tag(),
                        gimli::DW_TAG_class_type | gimli::DW_TAG_structure_type
                    );
                    if is_class && !flag(entry, gimli::DW_AT_declaration)? {
                        if let Some(ref name) = name {
                            let qualified = qualify(&scope, name);
                            let polymorphic = is_polymorphic(dwarf, unit, entry.offset(), 0)?;
                            self.types
                                .entry(qualified.clone())
                                .and_modify(|t| t.polymorphic |= polymorphic)
                                .or_insert(TypeDescriptor::new(qualified, polymorphic));
                        }
                    }
                    if entry.has_children() {
                        let label = name.unwrap_or_else(|| "(anonymous namespace)".to_string());
                        scope.push((depth, label));
                    }
                }
                gimli::DW_TAG_subprogram => {
                    let mut spans = Vec::new();
                    let mut ranges = dwarf.die_ranges(unit, entry)?;
                    while let Some(range) = ranges.next()? {
                        if range.begin < range.end {
                            spans.push((range.begin, range.end));
                        }
                    }
                    if !spans.is_empty() {
                        let signature = render_function_type(dwarf, unit, entry.offset())?;
                        for (low, high) in spans {
                            self.functions.push(FunctionRange {
                                low,
                                high,
                                signature: signature.clone(),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn from_parts(functions: Vec<(u64, u64, &str)>) -> Self {
        let mut functions: Vec<FunctionRange> = functions
            .into_iter()
            .map(|(low, high, sig)| FunctionRange { low, high, signature: sig.to_string() })
            .collect();
        functions.sort_by_key(|f| f.low);
        Self { functions, types: HashMap::new() }
    }
}

fn qualify(scope: &[(isize, String)], name: &str) -> String {
    let mut qualified = String::new();
    for (_, part) in scope {
        qualified.push_str(part);
        qualified.push_str("::");
    }
    qualified.push_str(name);
    qualified
}

fn attr_name<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    entry: &DebuggingInformationEntry<'_, '_, R>,
) -> gimli::Result<Option<String>> {
    match entry.attr_value(gimli::DW_AT_name)? {
        Some(value) => Ok(Some(dwarf.attr_string(unit, value)?.to_string_lossy()?.into_owned())),
        None => Ok(None),
    }
}

fn flag<R: Reader>(
    entry: &DebuggingInformationEntry<'_, '_, R>,
    name: gimli::DwAt,
) -> gimli::Result<bool> {
    Ok(matches!(entry.attr_value(name)?, Some(AttributeValue::Flag(true))))
}

fn unit_ref<R: Reader>(
    entry: &DebuggingInformationEntry<'_, '_, R>,
    name: gimli::DwAt,
) -> gimli::Result<Option<UnitOffset<R::Offset>>> {
    match entry.attr_value(name)? {
        Some(AttributeValue::UnitRef(offset)) => Ok(Some(offset)),
        _ => Ok(None),
    }
}

/// `offset` followed by the DIEs it refers back to through
/// `DW_AT_specification` and `DW_AT_abstract_origin`
fn origin_chain<R: Reader>(
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
) -> gimli::Result<Vec<UnitOffset<R::Offset>>> {
    let mut chain = vec![offset];
    let mut current = offset;
    while chain.len() < MAX_DEPTH {
        let entry = unit.entry(current)?;
        let next = match unit_ref(&entry, gimli::DW_AT_specification)? {
            Some(spec) => Some(spec),
            None => unit_ref(&entry, gimli::DW_AT_abstract_origin)?,
        };
        match next {
            Some(next) if !chain.contains(&next) => {
                chain.push(next);
                current = next;
            }
            _ => break,
        }
    }
    Ok(chain)
}

fn render_function_type<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
) -> gimli::Result<String> {
    let chain = origin_chain(unit, offset)?;

    let mut return_type = None;
    for off in &chain {
        if let Some(ty) = unit_ref(&unit.entry(*off)?, gimli::DW_AT_type)? {
            return_type = Some(ty);
            break;
        }
    }
    let return_name = match return_type {
        Some(ty) => type_name(dwarf, unit, ty, 0)?,
        None => "void".to_string(),
    };

    let mut params = Vec::new();
    for off in &chain {
        if collect_params(dwarf, unit, *off, &mut params)? {
            break;
        }
    }
    Ok(signature(&return_name, "", &params))
}

/// `ret (params)`, or `ret (declarator)(params)` for pointers to functions.
/// Pointer and reference return types take no space: `const char *()`.
fn signature(ret: &str, declarator: &str, params: &[String]) -> String {
    let gap = if ret.ends_with('*') || ret.ends_with('&') { "" } else { " " };
    let params = params.join(", ");
    if declarator.is_empty() {
        format!("{ret}{gap}({params})")
    } else {
        format!("{ret}{gap}({declarator})({params})")
    }
}

/// Push the rendered types of the non-artificial parameters of `offset`.
/// Returns false when the DIE lists no parameters at all.
fn collect_params<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    params: &mut Vec<String>,
) -> gimli::Result<bool> {
    let mut found = false;
    let mut tree = unit.entries_tree(Some(offset))?;
    let root = tree.root()?;
    let mut children = root.children();
    while let Some(child) = children.next()? {
        let child = child.entry();
        match child.tag() {
            gimli::DW_TAG_formal_parameter => {
                found = true;
                let chain = origin_chain(unit, child.offset())?;
                let mut artificial = false;
                let mut ty = None;
                for off in &chain {
                    let entry = unit.entry(*off)?;
                    artificial |= flag(&entry, gimli::DW_AT_artificial)?;
                    if ty.is_none() {
                        ty = unit_ref(&entry, gimli::DW_AT_type)?;
                    }
                }
                if !artificial {
                    params.push(match ty {
                        Some(ty) => type_name(dwarf, unit, ty, 0)?,
                        None => "?".to_string(),
                    });
                }
            }
            gimli::DW_TAG_unspecified_parameters => {
                found = true;
                params.push("...".to_string());
            }
            _ => {}
        }
    }
    Ok(found)
}

fn type_name<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    depth: usize,
) -> gimli::Result<String> {
    if depth > MAX_DEPTH {
        return Ok("?".to_string());
    }
    let entry = unit.entry(offset)?;
    let target = unit_ref(&entry, gimli::DW_AT_type)?;
    let inner = |target: Option<UnitOffset<R::Offset>>| match target {
        Some(t) => type_name(dwarf, unit, t, depth + 1),
        None => Ok("void".to_string()),
    };

    Ok(match entry.tag() {
        gimli::DW_TAG_pointer_type => {
            if let Some(t) = target {
                if unit.entry(t)?.tag() == gimli::DW_TAG_subroutine_type {
                    return subroutine_name(dwarf, unit, t, "*", depth + 1);
                }
            }
            pointer_like(&inner(target)?, "*")
        }
        gimli::DW_TAG_reference_type => pointer_like(&inner(target)?, "&"),
        gimli::DW_TAG_rvalue_reference_type => pointer_like(&inner(target)?, "&&"),
        gimli::DW_TAG_const_type => format!("const {}", inner(target)?),
        gimli::DW_TAG_volatile_type => format!("volatile {}", inner(target)?),
        gimli::DW_TAG_array_type => format!("{}[]", inner(target)?),
        gimli::DW_TAG_subroutine_type => subroutine_name(dwarf, unit, offset, "", depth)?,
        _ => attr_name(dwarf, unit, &entry)?.unwrap_or_else(|| "<anonymous>".to_string()),
    })
}

fn subroutine_name<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    declarator: &str,
    depth: usize,
) -> gimli::Result<String> {
    let entry = unit.entry(offset)?;
    let ret = match unit_ref(&entry, gimli::DW_AT_type)? {
        Some(t) => type_name(dwarf, unit, t, depth + 1)?,
        None => "void".to_string(),
    };
    let mut params = Vec::new();
    collect_params(dwarf, unit, offset, &mut params)?;
    Ok(signature(&ret, declarator, &params))
}

fn pointer_like(inner: &str, sigil: &str) -> String {
    if inner.ends_with('*') || inner.ends_with('&') {
        format!("{inner}{sigil}")
    } else {
        format!("{inner} {sigil}")
    }
}

/// A class is polymorphic when it owns a vtable pointer, declares a virtual
/// member function, or derives from a polymorphic base.
fn is_polymorphic<R: Reader>(
    dwarf: &gimli::Dwarf<R>,
    unit: &Unit<R>,
    offset: UnitOffset<R::Offset>,
    depth: usize,
) -> gimli::Result<bool> {
    if depth > MAX_DEPTH {
        return Ok(false);
    }
    if unit_ref(&unit.entry(offset)?, gimli::DW_AT_containing_type)?.is_some() {
        return Ok(true);
    }

    let mut tree = unit.entries_tree(Some(offset))?;
    let root = tree.root()?;
    let mut children = root.children();
    while let Some(child) = children.next()? {
        let child = child.entry();
        match child.tag() {
            gimli::DW_TAG_member => {
                if attr_name(dwarf, unit, child)?.is_some_and(|n| n.starts_with("_vptr")) {
                    return Ok(true);
                }
            }
            gimli::DW_TAG_subprogram => {
                if let Some(AttributeValue::Virtuality(v)) =
                    child.attr_value(gimli::DW_AT_virtuality)?
                {
                    if v != gimli::DW_VIRTUALITY_none {
                        return Ok(true);
                    }
                }
            }
            gimli::DW_TAG_inheritance => {
                if let Some(base) = unit_ref(child, gimli::DW_AT_type)? {
                    let base = strip_typedefs(unit, base)?;
                    if is_polymorphic(dwarf, unit, base, depth + 1)? {
                        return Ok(true);
                    }
                }
            }
            _ => {}
        }
    }
    Ok(false)
}

fn strip_typedefs<R: Reader>(
    unit: &Unit<R>,
    mut offset: UnitOffset<R::Offset>,
) -> gimli::Result<UnitOffset<R::Offset>> {
    for _ in 0..MAX_DEPTH {
        let entry = unit.entry(offset)?;
        match entry.tag() {
            gimli::DW_TAG_typedef | gimli::DW_TAG_const_type | gimli::DW_TAG_volatile_type => {
                match unit_ref(&entry, gimli::DW_AT_type)? {
                    Some(next) => offset = next,
                    None => break,
                }
            }
            _ => break,
        }
    }
    Ok(offset)
}
