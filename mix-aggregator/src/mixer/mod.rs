//! Merge rules: pick fields and arrays out of named sources and combine them.

pub mod epg;
pub mod playlist;
pub mod site;

pub use epg::mix_epg;
pub use playlist::mix_playlist;
pub use site::{mix_multi_repo, mix_site_repo};

use interfaces::{ArrayMixOpt, MixOpt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::extract::{extract_array, extract_scalar, parse_document};
use crate::filter::Filter;
use crate::traits::Sourcer;
use crate::types::{MixError, Result, SourceSnapshot};

/// Marks a value as relative to the document that contains it.
const RELATIVE_MARKER: &str = "./";

/// Rewrite `./x` against the directory of `origin`; anything else is returned as is.
pub fn resolve_relative(value: &str, origin: &str) -> String {
    let Some(rest) = value.strip_prefix(RELATIVE_MARKER) else {
        return value.to_string();
    };
    let base = match origin.rfind('/') {
        Some(i) => &origin[..=i],
        None => origin,
    };
    format!("{base}{rest}")
}

/// Elements whose fields may point at siblings of their source.
pub trait ResolveRelative {
    fn resolve_relative(self, origin: &str) -> Self;
}

/// Read the scalar at `rule.field` from the rule's source.
/// A missing field yields `""`; a missing source is an error.
pub async fn mix_scalar<S>(rule: &MixOpt, fallback: &str, sourcer: &S) -> Result<(String, SourceSnapshot)>
where
    S: Sourcer + ?Sized,
{
    let result = async {
        let source = sourcer.get_source(rule.resolve_source_name(fallback)).await?;
        let document = parse_document(source.data())?;
        Ok::<_, MixError>((extract_scalar(&document, &rule.field), source))
    };
    result.await.map_err(|e| e.in_rule(&rule.field))
}

/// Read the array at `rule.mix.field`, keep the elements whose `filter_by`
/// value passes the rule's patterns and decode them into `T`.
/// One element that fails to decode fails the whole rule.
pub async fn mix_array<T, S>(rule: &ArrayMixOpt, fallback: &str, sourcer: &S) -> Result<(Vec<T>, SourceSnapshot)>
where
    T: DeserializeOwned,
    S: Sourcer + ?Sized,
{
    let field = &rule.mix.field;
    let result = async {
        let source = sourcer.get_source(rule.mix.resolve_source_name(fallback)).await?;
        let document = parse_document(source.data())?;
        let filter = Filter::from_rule(rule);

        let mut items = Vec::new();
        for element in extract_array(&document, field) {
            if !filter.is_noop() && !filter.test(&extract_scalar(element, &rule.filter_by)) {
                continue;
            }
            let item: T = serde::Deserialize::deserialize(element)
                .map_err(|e| MixError::Merge(format!("{} element from {}: {e}", field, source.name)))?;
            items.push(item);
        }
        debug!("Rule on {}.{} kept {} elements", source.name, field, items.len());
        Ok::<_, MixError>((items, source))
    };
    result.await.map_err(|e| e.in_rule(field))
}

/// Run every enabled rule for one output array and concatenate the results
/// in rule order, resolving relative references against each rule's source.
pub(crate) async fn mix_arrays<T, S>(rules: &[ArrayMixOpt], fallback: &str, sourcer: &S) -> Result<Vec<T>>
where
    T: DeserializeOwned + ResolveRelative,
    S: Sourcer + ?Sized,
{
    let mut merged = Vec::new();
    for rule in rules {
        if rule.mix.disabled {
            continue;
        }
        if rule.mix.resolve_source_name(fallback).is_empty() {
            debug!("Skipping {} rule without a source", rule.mix.field);
            continue;
        }
        let (items, source) = mix_array::<T, S>(rule, fallback, sourcer).await?;
        merged.extend(items.into_iter().map(|item| item.resolve_relative(&source.url)));
    }
    Ok(merged)
}

impl ResolveRelative for String {
    fn resolve_relative(self, _origin: &str) -> Self {
        self
    }
}
