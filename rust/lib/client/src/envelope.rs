//! List envelope normalization.
//!
//! The backend wraps list responses differently per resource: grouped
//! by open/closed state, under a resource-named key, as a bare array, or
//! as a standard `{count, next, previous, results}` page. One table of
//! candidate key-paths per resource drives a single normalizer.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crm_core::Page;

/// Where a resource's rows may sit inside a list response.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeShape {
    /// Concatenated in order. Within a group, the first dotted path that
    /// resolves to an array contributes.
    pub groups: &'static [&'static [&'static str]],
    /// Flat array keys, tried in order when no group matched.
    pub flat: &'static [&'static str],
}

static SHAPES: &[(&str, EnvelopeShape)] = &[
    ("leads", EnvelopeShape {
        groups: &[
            &["open_leads.open_leads", "open_leads"],
            &["close_leads.close_leads", "close_leads"],
        ],
        flat: &["leads"],
    }),
    ("accounts", EnvelopeShape {
        groups: &[
            &["active_accounts.open_accounts", "active_accounts"],
            &["closed_accounts.close_accounts", "closed_accounts"],
        ],
        flat: &["accounts"],
    }),
    ("contacts", EnvelopeShape {
        groups: &[],
        flat: &["contact_obj_list", "contacts"],
    }),
    ("opportunities", EnvelopeShape {
        groups: &[&["open_opportunities"], &["closed_opportunities"]],
        flat: &["opportunities"],
    }),
    ("cases", EnvelopeShape {
        groups: &[&["open_cases"], &["close_cases", "closed_cases"]],
        flat: &["cases"],
    }),
    ("tasks", EnvelopeShape {
        groups: &[&["open_tasks"], &["closed_tasks"]],
        flat: &["tasks"],
    }),
    ("events", EnvelopeShape {
        groups: &[&["active_events"], &["closed_events"]],
        flat: &["events"],
    }),
    ("teams", EnvelopeShape {
        groups: &[],
        flat: &["teams"],
    }),
    ("documents", EnvelopeShape {
        groups: &[&["documents_active"], &["documents_inactive"]],
        flat: &["documents"],
    }),
    ("users", EnvelopeShape {
        groups: &[
            &["active_users.active_users", "active_users"],
            &["inactive_users.inactive_users", "inactive_users"],
        ],
        flat: &["users"],
    }),
    ("org", EnvelopeShape {
        groups: &[],
        flat: &["profile_org_list", "orgs", "organizations"],
    }),
];

/// Table entry for a resource, if it has one. Resources without an entry
/// are looked up under their own name.
pub fn shape_for(resource: &str) -> Option<&'static EnvelopeShape> {
    SHAPES
        .iter()
        .find(|(name, _)| *name == resource)
        .map(|(_, shape)| shape)
}

struct Envelope {
    page: Page<Value>,
    /// Counts came from the backend and must not be recomputed.
    paginated: bool,
}

/// Flatten a raw list response into one page. Unknown shapes give an
/// empty page, never an error.
pub fn normalize(resource: &str, raw: &Value) -> Page<Value> {
    unwrap_envelope(resource, raw).page
}

/// [`normalize`], then decode each row. Rows that do not decode are
/// dropped with a warning.
pub fn decode_page<T: DeserializeOwned>(resource: &str, raw: &Value) -> Page<T> {
    let Envelope { page, paginated } = unwrap_envelope(resource, raw);

    let total = page.results.len();
    let results: Vec<T> = page
        .results
        .into_iter()
        .enumerate()
        .filter_map(|(i, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(resource, row = i, error = %e, "dropping undecodable row");
                None
            }
        })
        .collect();

    let count = if paginated {
        page.count.saturating_sub(total - results.len())
    } else {
        results.len()
    };

    Page {
        count,
        next: page.next,
        previous: page.previous,
        results,
    }
}

fn unwrap_envelope(resource: &str, raw: &Value) -> Envelope {
    let shape = shape_for(resource);
    let groups: &[&[&str]] = shape.map(|s| s.groups).unwrap_or(&[]);
    let fallback = [resource];
    let flat: &[&str] = match shape {
        Some(s) => s.flat,
        None => &fallback,
    };

    match raw {
        Value::Array(rows) => return unpaginated(rows.clone()),
        Value::Object(obj) => {
            if let Some(Value::Array(rows)) = obj.get("results") {
                let count = obj
                    .get("count")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(rows.len());
                return Envelope {
                    page: Page {
                        count,
                        next: obj.get("next").and_then(Value::as_str).map(str::to_string),
                        previous: obj.get("previous").and_then(Value::as_str).map(str::to_string),
                        results: rows.clone(),
                    },
                    paginated: true,
                };
            }

            let mut rows = Vec::new();
            let mut matched = false;
            for group in groups {
                if let Some(items) = group.iter().find_map(|path| lookup_array(raw, path)) {
                    matched = true;
                    rows.extend(items.iter().cloned());
                }
            }
            if matched {
                return unpaginated(rows);
            }

            if let Some(items) = flat.iter().find_map(|path| lookup_array(raw, path)) {
                return unpaginated(items.clone());
            }
        }
        _ => {}
    }

    tracing::debug!(resource, "unrecognized list envelope, treating as empty");
    Envelope {
        page: Page::empty(),
        paginated: false,
    }
}

fn unpaginated(rows: Vec<Value>) -> Envelope {
    Envelope {
        page: Page::from_rows(rows),
        paginated: false,
    }
}

/// Resolve a dotted key-path to an array.
fn lookup_array<'a>(raw: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    path.split('.')
        .try_fold(raw, |node, key| node.get(key))
        .and_then(Value::as_array)
}
