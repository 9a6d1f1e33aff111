//! Facet filters layered on top of the kind predicates.

use crate::error::CompilationError;
use crate::error::Result;
use monitor_protocol::FacetFilters;
use monitor_protocol::Predicate;
use monitor_protocol::facet;
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Default, PartialEq)]
pub(crate) struct LayeredFacets {
    pub filters: Vec<Predicate>,
    pub post_filters: Vec<Predicate>,
}

pub(crate) fn layer_facets(facets: &FacetFilters) -> Result<LayeredFacets> {
    let mut layered = LayeredFacets::default();
    for (name, values) in facets.iter() {
        if name.trim().is_empty() {
            return Err(invalid(name, "facet name is empty"));
        }
        if values.iter().any(|value| value.trim().is_empty()) {
            return Err(invalid(name, "facet values must not be blank"));
        }
        if values.is_empty() {
            continue;
        }

        if name == facet::FILE_TYPE {
            layered.filters.push(file_type_predicate(values));
        } else if let Some(field) = facet::refinement_field(name) {
            layered
                .post_filters
                .push(Predicate::terms(field, refinement_values(name, values)?));
        } else {
            // Content profile and any custom facet name a stored field directly.
            layered
                .filters
                .push(Predicate::terms(name.as_str(), values.iter().map(String::as_str)));
        }
    }
    Ok(layered)
}

/// Packages that are themselves highlight collections are only counted
/// under the synthetic highlight-pack value.
fn file_type_predicate(values: &BTreeSet<String>) -> Predicate {
    let types: Vec<&str> = values
        .iter()
        .map(String::as_str)
        .filter(|value| *value != facet::HIGHLIGHTS_PACKAGE_TYPE)
        .collect();
    let wants_highlight_packs = values.contains(facet::HIGHLIGHTS_PACKAGE_TYPE);

    let plain = if types.is_empty() {
        None
    } else if types.contains(&facet::PACKAGE_TYPE) {
        Some(Predicate::and(vec![
            Predicate::not(Predicate::exists("highlight")),
            Predicate::terms(facet::FILE_TYPE, types),
        ]))
    } else {
        Some(Predicate::terms(facet::FILE_TYPE, types))
    };

    if !wants_highlight_packs {
        return plain.unwrap_or_else(|| Predicate::terms(facet::FILE_TYPE, Vec::<Value>::new()));
    }

    let highlight_packs = Predicate::and(vec![
        Predicate::exists("highlight"),
        Predicate::term(facet::FILE_TYPE, facet::PACKAGE_TYPE),
    ]);
    match plain {
        Some(plain) => Predicate::or(vec![highlight_packs, plain]),
        None => highlight_packs,
    }
}

/// Flag refinements are stored as booleans.
fn refinement_values(name: &str, values: &BTreeSet<String>) -> Result<Vec<Value>> {
    let is_flag = matches!(name, "legal" | "sms");
    values
        .iter()
        .map(|value| {
            if !is_flag {
                return Ok(Value::String(value.clone()));
            }
            match value.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                other => Err(invalid(name, &format!("expected true or false, got `{other}`"))),
            }
        })
        .collect()
}

fn invalid(facet: &str, reason: &str) -> CompilationError {
    CompilationError::InvalidFacet {
        facet: facet.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::Map;
    use serde_json::json;

    fn single(name: &str, values: &[&str]) -> FacetFilters {
        let mut out = FacetFilters::new();
        out.insert(name, values.iter().copied());
        out
    }

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn plain_types_become_a_single_terms_filter() {
        let layered = layer_facets(&single(facet::FILE_TYPE, &["picture", "text"]))
            .expect("layer");
        assert_eq!(
            layered.filters,
            vec![Predicate::terms(facet::FILE_TYPE, ["picture", "text"])]
        );
        assert!(layered.post_filters.is_empty());
    }

    #[test]
    fn packages_exclude_highlight_packs_unless_requested() {
        let packages = layer_facets(&single(facet::FILE_TYPE, &["composite"]))
            .expect("layer")
            .filters;
        let highlight_pack = doc(json!({"type": "composite", "highlight": "h1"}));
        let normal_pack = doc(json!({"type": "composite"}));
        assert!(!packages[0].matches(&highlight_pack));
        assert!(packages[0].matches(&normal_pack));

        let both = layer_facets(&single(facet::FILE_TYPE, &["composite", "highlight-pack"]))
            .expect("layer")
            .filters;
        assert!(both[0].matches(&highlight_pack));
        assert!(both[0].matches(&normal_pack));

        let only_packs = layer_facets(&single(facet::FILE_TYPE, &["highlight-pack"]))
            .expect("layer")
            .filters;
        assert!(only_packs[0].matches(&highlight_pack));
        assert!(!only_packs[0].matches(&normal_pack));
    }

    #[test]
    fn refinements_become_post_filters_on_stored_fields() {
        let mut filters = single("category", &["Sport"]);
        filters.insert("legal", ["true"]);
        let layered = layer_facets(&filters).expect("layer");
        assert!(layered.filters.is_empty());
        assert_eq!(
            layered.post_filters,
            vec![
                Predicate::terms("anpa_category.name", ["Sport"]),
                Predicate::terms("flags.marked_for_legal", [true]),
            ]
        );
    }

    #[test]
    fn profile_and_custom_facets_are_required() {
        let mut filters = single(facet::CONTENT_PROFILE, &["story"]);
        filters.insert("subject.qcode", ["15000000"]);
        let layered = layer_facets(&filters).expect("layer");
        assert_eq!(layered.filters.len(), 2);
        assert!(layered.post_filters.is_empty());
    }

    #[test]
    fn invalid_facets_are_rejected() {
        assert!(matches!(
            layer_facets(&single("legal", &["maybe"])),
            Err(CompilationError::InvalidFacet { .. })
        ));
        assert!(matches!(
            layer_facets(&single("urgency", &[" "])),
            Err(CompilationError::InvalidFacet { .. })
        ));
    }
}
