//! Facet names understood by the criteria compiler and the values with
//! special meaning inside them.

/// Content type facet (`text`, `picture`, `composite`, ...).
pub const FILE_TYPE: &str = "type";

/// Content profile facet.
pub const CONTENT_PROFILE: &str = "profile";

/// Item type of packages.
pub const PACKAGE_TYPE: &str = "composite";

/// Synthetic file type selecting packages that are highlight collections.
pub const HIGHLIGHTS_PACKAGE_TYPE: &str = "highlight-pack";

/// Refinement facets evaluated as post filters, with the stored field they
/// refine.
pub const REFINEMENTS: &[(&str, &str)] = &[
    ("urgency", "urgency"),
    ("priority", "priority"),
    ("source", "source"),
    ("genre", "genre.name"),
    ("category", "anpa_category.name"),
    ("desk", "task.desk"),
    ("language", "language"),
    ("legal", "flags.marked_for_legal"),
    ("sms", "flags.marked_for_sms"),
];

/// Stored field refined by a post-filter facet, if `name` is one.
pub fn refinement_field(name: &str) -> Option<&'static str> {
    REFINEMENTS
        .iter()
        .find(|(facet, _)| *facet == name)
        .map(|(_, field)| *field)
}
