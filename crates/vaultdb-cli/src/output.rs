//! Output formatting helpers for the CLI.
//!
//! On a terminal profiles render as a table; otherwise (pipes, tests) as
//! plain `key: value` lines.

use std::io::IsTerminal;

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use vaultdb_core::{Column, UserProfile, VaultState};

/// Field label/value pairs in display order. Empty fields are skipped.
fn profile_fields(profile: &UserProfile) -> Vec<(String, String)> {
    let mut fields = vec![("name".to_string(), profile.name.clone())];
    for column in Column::ALL {
        let value = profile.value(column);
        if profile.unreadable.contains(&column) {
            fields.push((column.to_string(), "<unreadable>".to_string()));
        } else if !value.is_null() {
            fields.push((column.to_string(), value.to_string()));
        }
    }
    if let Some(created_at) = profile.created_at {
        fields.push(("created_at".to_string(), created_at.to_rfc3339()));
    }
    if let Some(updated_at) = profile.updated_at {
        fields.push(("updated_at".to_string(), updated_at.to_rfc3339()));
    }
    fields
}

pub fn print_profile(profile: &UserProfile) {
    let fields = profile_fields(profile);
    if std::io::stdout().is_terminal() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Field", "Value"]);
        for (label, value) in fields {
            table.add_row(vec![label, value]);
        }
        println!("{}", table);
    } else {
        for (label, value) in fields {
            println!("{}: {}", label, value);
        }
    }
}

pub fn profile_json(profile: &UserProfile) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(profile)?)
}

pub fn print_status(store: &str, state: VaultState, json: bool) -> anyhow::Result<()> {
    if json {
        let value = serde_json::json!({ "store": store, "state": state });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Store: {}", store);
        println!("State: {}", state);
    }
    Ok(())
}
