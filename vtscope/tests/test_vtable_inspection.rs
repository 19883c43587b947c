//! Engine tests over a hand-built address space
//!
//! Layout mirrors what a C++ compiler emits for
//! `Shape { virtual ~Shape(); virtual double Area(); virtual const char *Name(); }`
//! with `Rectangle` and `Circle` overriding all three.

use std::collections::BTreeMap;

use vtscope::domain::{Address, InspectError};
use vtscope::memory::{MemoryImage, MemoryReader};
use vtscope::symbolization::{DataSymbol, ResolvedFunction, SymbolResolver};
use vtscope::vtable::{TargetObject, TypeDescriptor, VtableInspector, VtableRequest, VtableState};

const PTR: u64 = 8;

const RECT_VTABLE_SYM: u64 = 0x3d00;
const CIRCLE_VTABLE_SYM: u64 = 0x3d30;
const TYPEINFO_SYM: u64 = 0x3d60;

const RECT_OBJ: u64 = 0x4010;
const CIRCLE_OBJ: u64 = 0x4030;
const PLAIN_OBJ: u64 = 0x4050;
const SHAPE_PTR: u64 = 0x4060;

/// Symbol table of the fake executable
#[derive(Default)]
struct FakeSymbols {
    data: Vec<DataSymbol>,
    functions: BTreeMap<u64, ResolvedFunction>,
}

impl FakeSymbols {
    fn data(&mut self, name: &str, address: u64, size: u64) {
        self.data.push(DataSymbol { name: name.to_string(), address: Address(address), size });
    }

    fn function(&mut self, address: u64, name: &str, function_type: &str, line: u32) {
        self.functions.insert(
            address,
            ResolvedFunction {
                function_type: Some(function_type.to_string()),
                display_name: name.to_string(),
                file: Some("/src/demo/shapes.cpp".to_string()),
                line: Some(line),
                module: "shapes".to_string(),
            },
        );
    }
}

impl SymbolResolver for FakeSymbols {
    fn resolve_function(&self, address: Address) -> Option<ResolvedFunction> {
        self.functions.get(&address.0).cloned()
    }

    fn resolve_data_symbol(&self, address: Address) -> Option<DataSymbol> {
        self.data.iter().find(|s| s.contains(address)).cloned()
    }
}

fn rect_slots() -> [Address; 4] {
    [Address(0x1a10), Address(0x1a40), Address(0x1a70), Address(0x1aa0)]
}

fn circle_slots() -> [Address; 4] {
    [Address(0x1b10), Address(0x1b40), Address(0x1b70), Address(0x1ba0)]
}

/// Address stored in objects: two header words into the symbol
fn vtable_of(symbol: u64) -> Address {
    Address(symbol + 2 * PTR)
}

fn fixture() -> (MemoryImage, FakeSymbols) {
    let mut image = MemoryImage::new(8);
    let mut symbols = FakeSymbols::default();

    for (symbol, name, slots) in [
        (RECT_VTABLE_SYM, "vtable for Rectangle", rect_slots()),
        (CIRCLE_VTABLE_SYM, "vtable for Circle", circle_slots()),
    ] {
        // offset-to-top, typeinfo, then four slots: 48 bytes
        let mut words = vec![Address(0), Address(TYPEINFO_SYM)];
        words.extend(slots);
        image.write_pointers(Address(symbol), &words);
        symbols.data(name, symbol, 6 * PTR);
    }
    symbols.data("typeinfo for Rectangle", TYPEINFO_SYM, 24);

    let [r0, r1, r2, r3] = rect_slots();
    symbols.function(r0.0, "Rectangle::~Rectangle()", "void ()", 21);
    symbols.function(r1.0, "Rectangle::~Rectangle()", "void ()", 21);
    symbols.function(r2.0, "Rectangle::Area() const", "double ()", 22);
    symbols.function(r3.0, "Rectangle::Name() const", "const char *()", 23);
    // Circle's destructors stay unresolved, as in a library without symbols
    let [_, _, c2, c3] = circle_slots();
    symbols.function(c2.0, "Circle::Area() const", "double ()", 34);
    symbols.function(c3.0, "Circle::Name() const", "const char *()", 35);

    image.write_pointers(Address(RECT_OBJ), &[vtable_of(RECT_VTABLE_SYM), Address(0x4008)]);
    image.write_pointers(Address(CIRCLE_OBJ), &[vtable_of(CIRCLE_VTABLE_SYM)]);
    image.write_pointers(Address(PLAIN_OBJ), &[Address(0x0000_0002_0000_0001)]);
    image.write_pointer(Address(SHAPE_PTR), Address(RECT_OBJ));

    symbols.data("g_rect", RECT_OBJ, 24);
    symbols.data("g_plain", PLAIN_OBJ, 8);

    (image, symbols)
}

fn shape() -> TypeDescriptor {
    TypeDescriptor::polymorphic("Shape")
}

#[test]
fn test_two_methods_and_destructor_give_four_entries() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    let vtable = inspector
        .get_vtable(&TargetObject::new(Address(RECT_OBJ), shape()))
        .unwrap()
        .expect("Rectangle is polymorphic");

    assert_eq!(vtable.len(), 4);
    let indices: Vec<usize> = vtable.entries().iter().map(|e| e.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[test]
fn test_name_is_runtime_type() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    // Static type Shape, runtime type Rectangle
    let vtable =
        inspector.get_vtable(&TargetObject::new(Address(RECT_OBJ), shape())).unwrap().unwrap();
    assert_eq!(vtable.name(), "vtable for Rectangle");
    assert_eq!(vtable.type_name(), vtable.name());
    assert_eq!(vtable.runtime_type.name, "Rectangle");
}

#[test]
fn test_addresses_match_independent_reads() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);
    let vtable =
        inspector.get_vtable(&TargetObject::new(Address(RECT_OBJ), shape())).unwrap().unwrap();

    let first_word = image.read_pointer(Address(RECT_OBJ)).unwrap();
    assert_eq!(vtable.address(), first_word);

    for entry in vtable.entries() {
        let slot = Address(first_word.0 + entry.index as u64 * PTR);
        assert_eq!(entry.raw_value, image.read_pointer(slot).unwrap());
    }
}

#[test]
fn test_base_pointer_reinspected_after_swap() {
    let (mut image, symbols) = fixture();

    let first = {
        let inspector = VtableInspector::new(&image, &symbols);
        let object = TargetObject::from_pointer(&image, Address(SHAPE_PTR), shape()).unwrap();
        inspector.get_vtable(&object).unwrap().unwrap()
    };
    assert_eq!(first.name(), "vtable for Rectangle");

    // Debuggee runs and repoints the variable
    image.write_pointer(Address(SHAPE_PTR), Address(CIRCLE_OBJ));

    let inspector = VtableInspector::new(&image, &symbols);
    let object = TargetObject::from_pointer(&image, Address(SHAPE_PTR), shape()).unwrap();
    let second = inspector.get_vtable(&object).unwrap().unwrap();
    assert_eq!(second.name(), "vtable for Circle");
    assert_eq!(second.address(), vtable_of(CIRCLE_VTABLE_SYM));
    assert_ne!(first.entries()[2].raw_value, second.entries()[2].raw_value);
}

#[test]
fn test_non_polymorphic_object_reads_nothing() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    let object = TargetObject::new(Address(PLAIN_OBJ), TypeDescriptor::plain("Plain"));
    assert_eq!(inspector.get_vtable(&object).unwrap(), None);
    assert_eq!(image.read_count(), 0);
}

#[test]
fn test_summaries_name_function_file_and_line() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);
    let vtable =
        inspector.get_vtable(&TargetObject::new(Address(RECT_OBJ), shape())).unwrap().unwrap();

    let area = &vtable.entries()[2];
    assert!(area.summary.contains("Rectangle::Area() const"), "{}", area.summary);
    assert!(area.summary.contains("shapes.cpp:22"), "{}", area.summary);
    assert!(area.summary.starts_with("(double ()) [2] = 0x0000000000001a70"));
    assert_eq!(area.function_type(), Some("double ()"));
}

#[test]
fn test_unresolved_entries_keep_raw_value() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);
    let vtable =
        inspector.get_vtable(&TargetObject::new(Address(CIRCLE_OBJ), shape())).unwrap().unwrap();

    let dtor = &vtable.entries()[0];
    assert!(dtor.function.is_none());
    assert_eq!(dtor.raw_value, circle_slots()[0]);
    assert_eq!(dtor.summary, "[0] = 0x0000000000001b10");
    assert!(vtable.entries()[3].function.is_some());
}

#[test]
fn test_partial_enumeration_keeps_earlier_entries() {
    let (mut image, symbols) = fixture();
    // Only the header and the first two slots stay readable
    image.unmap(Address(RECT_VTABLE_SYM));
    image.write_pointers(
        Address(RECT_VTABLE_SYM),
        &[Address(0), Address(TYPEINFO_SYM), rect_slots()[0], rect_slots()[1]],
    );

    let inspector = VtableInspector::new(&image, &symbols);
    let vtable_address =
        inspector.locate(&TargetObject::new(Address(RECT_OBJ), shape())).unwrap().unwrap();
    let runtime_type = inspector.runtime_type(vtable_address).unwrap();
    assert_eq!(runtime_type.slot_count, 4);

    let partial = inspector.enumerate(vtable_address, &runtime_type).unwrap_err();
    assert_eq!(partial.entries.len(), 2);
    assert_eq!(partial.entries[1].raw_value, rect_slots()[1]);
    assert!(matches!(partial.error, InspectError::VtableEntryRead { index: 2, .. }));

    // The one-call API reports the failure
    let err = inspector.get_vtable(&TargetObject::new(Address(RECT_OBJ), shape())).unwrap_err();
    assert!(matches!(err, InspectError::VtableEntryRead { index: 2, .. }));
}

#[test]
fn test_unreadable_object_is_memory_error() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    let err = inspector.get_vtable(&TargetObject::new(Address(0x9000), shape())).unwrap_err();
    assert!(matches!(err, InspectError::MemoryAccess { address: Address(0x9000), .. }));
}

#[test]
fn test_first_word_must_point_into_a_vtable() {
    let (mut image, symbols) = fixture();
    let inspector_err = |image: &MemoryImage| {
        VtableInspector::new(image, &symbols)
            .get_vtable(&TargetObject::new(Address(RECT_OBJ), shape()))
            .unwrap_err()
    };

    // Points at nothing known
    image.write_pointer(Address(RECT_OBJ), Address(0x7777_0000));
    let unknown = InspectError::UnknownVtable { address: Address(0x7777_0000) };
    assert_eq!(inspector_err(&image), unknown);

    // Points into a data symbol that is not a vtable
    image.write_pointer(Address(RECT_OBJ), Address(PLAIN_OBJ));
    match inspector_err(&image) {
        InspectError::NotAVtable { symbol, .. } => assert_eq!(symbol, "g_plain"),
        other => panic!("expected NotAVtable, got {other:?}"),
    }
}

#[test]
fn test_null_base_pointer() {
    let (mut image, _) = fixture();
    image.write_pointer(Address(SHAPE_PTR), Address(0));
    let err = TargetObject::from_pointer(&image, Address(SHAPE_PTR), shape()).unwrap_err();
    assert_eq!(err, InspectError::NullPointer { address: Address(SHAPE_PTR) });
}

#[test]
fn test_finished_request_is_terminal() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    let mut request = VtableRequest::new(TargetObject::new(Address(RECT_OBJ), shape()));
    assert_eq!(request.state(), &VtableState::Unresolved);

    request.run(&inspector).unwrap();
    assert!(request.state().is_terminal());
    let reads = image.read_count();
    assert_eq!(reads, 5); // object word + four slots

    request.run(&inspector).unwrap();
    assert_eq!(image.read_count(), reads);
    assert_eq!(request.state().vtable().map(|v| v.len()), Some(4));
}

#[test]
fn test_failed_request_stays_unresolved() {
    let (image, symbols) = fixture();
    let inspector = VtableInspector::new(&image, &symbols);

    let mut request = VtableRequest::new(TargetObject::new(Address(0x9000), shape()));
    assert!(request.run(&inspector).is_err());
    assert_eq!(request.state(), &VtableState::Unresolved);
}

#[test]
fn test_four_byte_pointers() {
    let mut image = MemoryImage::new(4);
    let mut symbols = FakeSymbols::default();
    image.write_pointers(
        Address(0x8000),
        &[Address(0), Address(0x8100), Address(0x1000), Address(0x1010), Address(0x1020)],
    );
    symbols.data("vtable for Widget", 0x8000, 20);
    image.write_pointer(Address(0x9000), Address(0x8008));

    let inspector = VtableInspector::new(&image, &symbols);
    let vtable = inspector
        .get_vtable(&TargetObject::new(Address(0x9000), TypeDescriptor::polymorphic("Widget")))
        .unwrap()
        .unwrap();
    assert_eq!(vtable.pointer_size, 4);
    assert_eq!(
        vtable.entries().iter().map(|e| e.raw_value).collect::<Vec<_>>(),
        vec![Address(0x1000), Address(0x1010), Address(0x1020)]
    );
}
