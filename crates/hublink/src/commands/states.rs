//! `hublink states`: entity listing and detail over the HTTP API.

use serde_json::Value;
use tabled::Tabled;

use hublink_core::{Entity, EntityQuery, HubClient, MatchMode};

use crate::cli::{GlobalOpts, StatesArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct EntityRow {
    #[tabled(rename = "Entity")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl EntityRow {
    fn new(entity: &Entity, color: bool) -> Self {
        Self {
            id: entity.id.clone(),
            state: output::paint_state(&entity.state, color),
            name: entity.friendly_name().unwrap_or_default().to_owned(),
            updated: entity.last_updated.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Parse `key=value`; the value is JSON when it parses, a string otherwise.
pub(crate) fn parse_attr(raw: &str) -> Result<(String, Value), CliError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| CliError::Validation {
        field: "attr".into(),
        reason: format!("expected KEY=VALUE, got '{raw}'"),
    })?;
    if key.is_empty() {
        return Err(CliError::Validation {
            field: "attr".into(),
            reason: "attribute name cannot be empty".into(),
        });
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_owned()));
    Ok((key.to_owned(), value))
}

fn build_query(args: &StatesArgs) -> Result<EntityQuery, CliError> {
    let mut query = EntityQuery::default();
    if let Some(ref term) = args.search {
        let mode = if args.prefix {
            MatchMode::Prefix
        } else {
            MatchMode::Substring
        };
        query = query.search(term.clone(), mode);
    }
    if let Some(ref domain) = args.domain {
        query = query.domain(domain.clone());
    }
    if let Some(ref raw) = args.attr {
        let (key, value) = parse_attr(raw)?;
        query = query.attribute(key, value);
    }
    Ok(query)
}

fn detail(entity: &Entity, color: bool) -> String {
    let mut lines = vec![
        format!("Entity:   {}", entity.id),
        format!("Name:     {}", entity.display_name()),
        format!("State:    {}", output::paint_state(&entity.state, color)),
        format!("Changed:  {}", entity.last_changed.to_rfc3339()),
        format!("Updated:  {}", entity.last_updated.to_rfc3339()),
    ];
    if !entity.attributes.is_empty() {
        lines.push("Attributes:".into());
        for (key, value) in &entity.attributes {
            lines.push(format!("  {key}: {value}"));
        }
    }
    lines.join("\n")
}

pub async fn handle(client: &HubClient, args: StatesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(global.color);

    if let Some(ref entity_id) = args.entity_id {
        let entity = client
            .fetch_state(entity_id)
            .await?
            .ok_or_else(|| CliError::NotFound {
                entity_id: entity_id.clone(),
            })?;
        let out = output::render_single(
            global.output,
            &entity,
            |e| detail(e, color),
            |e| e.state.clone(),
        )?;
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let query = build_query(&args)?;
    let mut entities = query.filter(client.fetch_states().await?);
    entities.sort_by(|a, b| a.id.cmp(&b.id));

    let out = output::render_list(
        global.output,
        &entities,
        |e| EntityRow::new(e, color),
        |e| e.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use serde_json::json;

    use super::*;

    #[test]
    fn attr_values_parse_as_json_when_possible() {
        assert_eq!(
            parse_attr("brightness=255").unwrap(),
            ("brightness".into(), json!(255))
        );
        assert_eq!(
            parse_attr("device_class=temperature").unwrap(),
            ("device_class".into(), json!("temperature"))
        );
        assert_eq!(
            parse_attr("url=http://x/?a=b").unwrap(),
            ("url".into(), json!("http://x/?a=b"))
        );
    }

    #[test]
    fn attr_without_separator_is_rejected() {
        assert!(matches!(
            parse_attr("brightness"),
            Err(CliError::Validation { .. })
        ));
        assert!(parse_attr("=1").is_err());
    }
}
