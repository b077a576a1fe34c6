//! `chorus providers`: show configured providers and optionally probe them.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};

use chorus_infra::llm::{build_registry, check_provider};
use chorus_types::config::AppConfig;
use chorus_types::llm::ProviderConfig;

/// Status of one provider as reported by `chorus providers`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRow {
    pub name: String,
    pub kind: String,
    pub model: String,
    pub key_env: String,
    pub key_present: bool,
    /// `None` when not checked; `Some(Err(_))` holds the failure message.
    pub check: Option<Result<(), String>>,
}

/// Collect one row per configured provider.
///
/// `lookup_key` resolves an environment variable name to its value.
pub fn provider_rows<F>(providers: &[ProviderConfig], lookup_key: F) -> Vec<ProviderRow>
where
    F: Fn(&str) -> Option<String>,
{
    providers
        .iter()
        .map(|p| ProviderRow {
            name: p.name.clone(),
            kind: p.kind.to_string(),
            model: p.model.clone(),
            key_env: p.api_key_env.clone(),
            key_present: lookup_key(&p.api_key_env).is_some_and(|k| !k.trim().is_empty()),
            check: None,
        })
        .collect()
}

/// Print the provider table, probing each reachable provider when `check` is set.
pub async fn list_providers(config: &AppConfig, check: bool) -> Result<()> {
    let lookup = |key: &str| std::env::var(key).ok();
    let mut rows = provider_rows(&config.providers, lookup);

    if check {
        let registry = build_registry(&config.providers, &config.retry, lookup);
        for row in &mut rows {
            if let Some(entry) = registry.get(&row.name) {
                row.check = Some(check_provider(entry).await.map_err(|e| e.to_string()));
            }
        }
    }

    println!("{}", render_table(&rows, &config.pipeline.default_summary_model));
    Ok(())
}

fn render_table(rows: &[ProviderRow], summary_model: &str) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Model").fg(Color::White),
        Cell::new("Key").fg(Color::White),
        Cell::new("Check").fg(Color::White),
    ]);

    for row in rows {
        let name = if row.name == summary_model {
            format!("{} (summarizer)", row.name)
        } else {
            row.name.clone()
        };
        let key_cell = if row.key_present {
            Cell::new(&row.key_env).fg(Color::Green)
        } else {
            Cell::new(format!("{} (unset)", row.key_env)).fg(Color::Red)
        };
        let check_cell = match &row.check {
            None => Cell::new("-"),
            Some(Ok(())) => Cell::new("ok").fg(Color::Green),
            Some(Err(message)) => Cell::new(message).fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(name),
            Cell::new(&row.kind),
            Cell::new(&row.model),
            key_cell,
            check_cell,
        ]);
    }

    table
}
