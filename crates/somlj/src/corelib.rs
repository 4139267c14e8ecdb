//! The built-in class library, embedded in the binary.
//!
//! These sources are consulted before any filesystem class path, and the
//! classes listed in [`FORCE_LOADED`] are brought in before the user's main
//! class so their scopes exist for resolution.

/// Classes loaded before the main class, in this order.
pub const FORCE_LOADED: [&str; 15] = [
    "Metaclass",
    "Class",
    "System",
    "Boolean",
    "True",
    "False",
    "Nil",
    "Block",
    "String",
    "Symbol",
    "Integer",
    "Double",
    "Array",
    "Method",
    "Primitive",
];

const SOURCES: [(&str, &str); 16] = [
    ("Object", include_str!("../corelib/Object.som")),
    ("Metaclass", include_str!("../corelib/Metaclass.som")),
    ("Class", include_str!("../corelib/Class.som")),
    ("System", include_str!("../corelib/System.som")),
    ("Boolean", include_str!("../corelib/Boolean.som")),
    ("True", include_str!("../corelib/True.som")),
    ("False", include_str!("../corelib/False.som")),
    ("Nil", include_str!("../corelib/Nil.som")),
    ("Block", include_str!("../corelib/Block.som")),
    ("String", include_str!("../corelib/String.som")),
    ("Symbol", include_str!("../corelib/Symbol.som")),
    ("Integer", include_str!("../corelib/Integer.som")),
    ("Double", include_str!("../corelib/Double.som")),
    ("Array", include_str!("../corelib/Array.som")),
    ("Method", include_str!("../corelib/Method.som")),
    ("Primitive", include_str!("../corelib/Primitive.som")),
];

/// Looks up an embedded class source by class name.
#[must_use]
pub fn find(name: &str) -> Option<&'static str> {
    SOURCES.iter().find(|(n, _)| *n == name).map(|(_, src)| *src)
}
