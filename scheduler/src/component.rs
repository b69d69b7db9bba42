//! The closed set of model-data component identifiers.

/// A named slot in the model data.
///
/// The core treats these as opaque, equatable, hashable tokens — it never
/// inspects the value stored under one. The variant names are preserved for
/// interop with upstream callers and cover the set named in the interface
/// contract; `Other` absorbs anything else a caller wants to key by without
/// forcing a crate release to add a variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentId {
    /// The subject graph being processed.
    DataGraph,
    /// The SHACL shapes graph used to validate [`ComponentId::DataGraph`].
    SHACLShapesGraph,
    /// The most recently produced validation report.
    ValidationReport,
    /// The external I/O adapter component.
    IO,
    /// The outer user-interface component.
    UI,
    /// Escape hatch for caller-defined components outside the closed set.
    Other(u32),
}
