use crate::db;
use crate::fees::FeeView;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
pub enum SetupSection {
    Ledger,
    Export,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ledger" => Some(Self::Ledger),
            "export" => Some(Self::Export),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Ledger => "setup.ledger",
            Self::Export => "setup.export",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Ledger => json!({
            "defaultFeeView": "total",
            "defaultView": "school",
            "currencyLabel": "₹"
        }),
        SetupSection::Export => json!({
            "includeAcademicYear": true,
            "filenamePrefix": "master-ledger"
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.chars().count() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Ledger => match k.as_str() {
                "defaultFeeView" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    let Some(view) = FeeView::parse(&s) else {
                        return Err("defaultFeeView must be one of: total, due".into());
                    };
                    obj.insert(k.clone(), Value::String(view.as_str().to_string()));
                }
                "defaultView" => {
                    let s = parse_string_max(v, k, 8)?.to_ascii_lowercase();
                    if s != "school" && s != "class" {
                        return Err("defaultView must be one of: school, class".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                "currencyLabel" => {
                    let s = parse_string_max(v, k, 8)?;
                    if s.is_empty() {
                        return Err("currencyLabel must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown ledger field: {}", k)),
            },
            SetupSection::Export => match k.as_str() {
                "includeAcademicYear" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "filenamePrefix" => {
                    let s = parse_string_max(v, k, 40)?;
                    if s.is_empty() {
                        return Err("filenamePrefix must not be empty".into());
                    }
                    if s.contains(['/', '\\']) {
                        return Err("filenamePrefix must not contain path separators".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown export field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults.
            if let Err(msg) = merge_section_patch(section, &mut current, saved_obj) {
                tracing::warn!(key = section.key(), %msg, "ignoring saved setup values");
                current = default_section(section);
            }
        }
    }
    Ok(current)
}

/// Ledger preferences read by the ledger handlers.
#[derive(Debug, Clone)]
pub struct LedgerPrefs {
    pub default_fee_view: FeeView,
    pub currency_label: String,
    pub include_academic_year: bool,
    pub filename_prefix: String,
}

pub fn ledger_prefs(conn: &rusqlite::Connection) -> anyhow::Result<LedgerPrefs> {
    let ledger = load_section(conn, SetupSection::Ledger)?;
    let export = load_section(conn, SetupSection::Export)?;
    Ok(LedgerPrefs {
        default_fee_view: ledger
            .get("defaultFeeView")
            .and_then(|v| v.as_str())
            .and_then(FeeView::parse)
            .unwrap_or(FeeView::Total),
        currency_label: ledger
            .get("currencyLabel")
            .and_then(|v| v.as_str())
            .unwrap_or("₹")
            .to_string(),
        include_academic_year: export
            .get("includeAcademicYear")
            .and_then(|v| v.as_bool())
            .unwrap_or(true),
        filename_prefix: export
            .get("filenamePrefix")
            .and_then(|v| v.as_str())
            .unwrap_or("master-ledger")
            .to_string(),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let ledger = match load_section(conn, SetupSection::Ledger) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let export = match load_section(conn, SetupSection::Export) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "ledger": ledger, "export": export }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    tracing::info!(key = section.key(), "setup updated");
    ok(&req.id, json!({ "ok": true, section_raw: current }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_patch_normalizes_and_rejects_unknown_fields() {
        let mut cur = default_section(SetupSection::Ledger);
        let patch = json!({ "defaultFeeView": "DUE", "currencyLabel": " Rs " });
        merge_section_patch(SetupSection::Ledger, &mut cur, patch.as_object().unwrap()).unwrap();
        assert_eq!(cur["defaultFeeView"], "due");
        assert_eq!(cur["currencyLabel"], "Rs");

        let bad = json!({ "theme": "dark" });
        let e = merge_section_patch(SetupSection::Ledger, &mut cur, bad.as_object().unwrap())
            .unwrap_err();
        assert!(e.contains("unknown ledger field"));
    }

    #[test]
    fn blank_currency_label_is_rejected() {
        let mut cur = default_section(SetupSection::Ledger);
        let blank = json!({ "currencyLabel": "   " });
        let e = merge_section_patch(SetupSection::Ledger, &mut cur, blank.as_object().unwrap())
            .unwrap_err();
        assert!(e.contains("currencyLabel must not be empty"));
    }

    #[test]
    fn export_prefix_is_bounded() {
        let mut cur = default_section(SetupSection::Export);
        let long = json!({ "filenamePrefix": "x".repeat(41) });
        assert!(
            merge_section_patch(SetupSection::Export, &mut cur, long.as_object().unwrap()).is_err()
        );
        let sep = json!({ "filenamePrefix": "a/b" });
        assert!(
            merge_section_patch(SetupSection::Export, &mut cur, sep.as_object().unwrap()).is_err()
        );
        assert_eq!(cur["filenamePrefix"], "master-ledger");
    }
}
