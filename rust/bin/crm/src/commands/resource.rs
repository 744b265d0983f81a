//! Generic resource commands.
//!
//! `crm get leads`, `crm create contact -f contact.json`, etc.
//! Resource names map to typed services; records print as JSON or as a
//! short table.

use std::path::Path;

use anyhow::Result;
use serde_json::{Map, Value};

use crm_client::{FileUpload, Id, ListQuery, Payload};

use super::connect;

/// Resources the CLI can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Lead,
    Account,
    Contact,
    Opportunity,
    Task,
    Event,
    Case,
    Team,
    Document,
    Invoice,
    Planner,
}

impl Kind {
    /// Accept singular or plural names.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name.to_lowercase().as_str() {
            "lead" | "leads" => Kind::Lead,
            "account" | "accounts" => Kind::Account,
            "contact" | "contacts" => Kind::Contact,
            "opportunity" | "opportunities" | "opp" | "opps" => Kind::Opportunity,
            "task" | "tasks" => Kind::Task,
            "event" | "events" => Kind::Event,
            "case" | "cases" => Kind::Case,
            "team" | "teams" => Kind::Team,
            "document" | "documents" | "doc" | "docs" => Kind::Document,
            "invoice" | "invoices" => Kind::Invoice,
            "planner" | "planner-event" | "planner-events" => Kind::Planner,
            _ => anyhow::bail!("Unknown resource type: {}", name),
        })
    }
}

/// Run `$body` with `$client` bound to the typed service for `$kind`.
/// The body must evaluate to the same type in every arm.
macro_rules! with_client {
    ($kind:expr, $crm:expr, |$client:ident| $body:expr) => {
        match $kind {
            Kind::Lead => { let $client = $crm.leads(); $body }
            Kind::Account => { let $client = $crm.accounts(); $body }
            Kind::Contact => { let $client = $crm.contacts(); $body }
            Kind::Opportunity => { let $client = $crm.opportunities(); $body }
            Kind::Task => { let $client = $crm.tasks(); $body }
            Kind::Event => { let $client = $crm.events(); $body }
            Kind::Case => { let $client = $crm.cases(); $body }
            Kind::Team => { let $client = $crm.teams(); $body }
            Kind::Document => { let $client = $crm.documents(); $body }
            Kind::Invoice => { let $client = $crm.invoices(); $body }
            Kind::Planner => { let $client = $crm.planner(); $body }
        }
    };
}

/// List options of `crm get`.
#[derive(Debug, Default)]
pub struct ListArgs {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub search: Option<String>,
    pub ordering: Option<String>,
    pub filters: Vec<String>,
}

impl ListArgs {
    fn to_query(&self) -> Result<ListQuery> {
        let mut query = ListQuery::new();
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.offset(offset);
        }
        if let Some(search) = &self.search {
            query = query.search(search.clone());
        }
        if let Some(ordering) = &self.ordering {
            query = query.ordering(ordering.clone());
        }
        for filter in &self.filters {
            let (key, value) = filter
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Filter must be key=value, got: {}", filter))?;
            query = query.filter(key.trim(), value.trim());
        }
        Ok(query)
    }
}

/// GET one record or a page of records.
pub async fn get(
    resource: &str,
    id: Option<&str>,
    args: &ListArgs,
    json_output: bool,
    config_path: &Path,
) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let (_, crm) = connect(config_path)?;

    if let Some(id) = id {
        let record = with_client!(kind, crm, |c| serde_json::to_value(c.get(Id::from(id)).await?)?);
        print_record(&record, json_output)?;
        return Ok(());
    }

    let query = args.to_query()?;
    let page = with_client!(kind, crm, |c| c.list_raw(&query).await?);
    if json_output {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.is_empty() {
        println!("No {} found.", resource);
        return Ok(());
    }
    println!("{:8} {}", "ID", "NAME");
    for row in &page.results {
        println!("{:8} {}", row_id(row), row_label(row));
    }
    println!("({} of {})", page.len(), page.count);
    Ok(())
}

/// POST a new record from form JSON. Unassigned records are assigned to
/// the signed-in profile.
pub async fn create(resource: &str, json_body: &str, config_path: &Path) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let form = parse_object(json_body)?;
    let (_, crm) = connect(config_path)?;

    let record = with_client!(kind, crm, |c| serde_json::to_value(c.create_from_form(form).await?)?);
    println!("Created {} {}.", resource, row_id(&record));
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// PUT (`partial == false`) or PATCH a record.
pub async fn update(
    resource: &str,
    id: &str,
    json_body: &str,
    partial: bool,
    config_path: &Path,
) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let form = parse_object(json_body)?;
    let (_, crm) = connect(config_path)?;
    let id = Id::from(id);

    let record = if partial {
        let payload = Payload::from_map(form);
        with_client!(kind, crm, |c| serde_json::to_value(c.partial_update(id.clone(), &payload).await?)?)
    } else {
        with_client!(kind, crm, |c| serde_json::to_value(c.update_from_form(id.clone(), form).await?)?)
    };
    println!("Updated {} {}.", resource, id);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn delete(resource: &str, id: &str, config_path: &Path) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let (_, crm) = connect(config_path)?;
    with_client!(kind, crm, |c| c.delete(Id::from(id)).await?);
    println!("Deleted {} {}.", resource, id);
    Ok(())
}

pub async fn comment(resource: &str, id: &str, text: &str, config_path: &Path) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let (_, crm) = connect(config_path)?;
    let comment = with_client!(kind, crm, |c| c.add_comment(Id::from(id), text).await?);
    println!("Comment {} added to {} {}.", comment.id.map(|i| i.to_string()).unwrap_or_default(), resource, id);
    Ok(())
}

pub async fn attach(resource: &str, id: &str, file: &Path, config_path: &Path) -> Result<()> {
    let kind = Kind::parse(resource)?;
    let upload = FileUpload::from_path(crm_client::resource::ATTACHMENT_FIELD, file)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", file.display(), e))?;
    let (_, crm) = connect(config_path)?;
    let attachment = with_client!(kind, crm, |c| c.add_attachment(Id::from(id), upload).await?);
    println!(
        "Attached {} to {} {}.",
        attachment.file_name.as_deref().unwrap_or("file"),
        resource,
        id
    );
    Ok(())
}

pub async fn search(text: &str, json_output: bool, config_path: &Path) -> Result<()> {
    let (_, crm) = connect(config_path)?;
    let results = crm.search(text).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&results.0)?);
        return Ok(());
    }
    if results.is_empty() {
        println!("No matches for \"{}\".", text);
        return Ok(());
    }
    for (resource, rows) in &results.0 {
        println!("{} ({})", resource, rows.len());
        for row in rows {
            println!("  {:8} {}", row_id(row), row_label(row));
        }
    }
    Ok(())
}

/// Show the current context and whether its session still works.
pub async fn status(config_path: &Path) -> Result<()> {
    let (ctx, crm) = connect(config_path)?;
    let session = crm.session();

    println!("Context:   {}", ctx.name);
    println!("Server:    {}", crm.api().config().base_url);
    println!("Org:       {}", session.org_id().as_deref().unwrap_or("-"));

    if !session.is_authenticated() {
        println!("Status:    not logged in");
        return Ok(());
    }
    match crm.profile().await {
        Ok(profile) => println!("Status:    logged in as {}", profile.display_name()),
        Err(e) => println!("Status:    error ({})", e),
    }
    Ok(())
}

fn parse_object(json_body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(json_body).map_err(|e| anyhow::anyhow!("Invalid JSON: {}", e))? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("Expected a JSON object."),
    }
}

fn print_record(record: &Value, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }
    let Some(obj) = record.as_object() else {
        println!("{}", record);
        return Ok(());
    };
    for (key, value) in obj {
        let shown = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("{:20} {}", key, shown);
    }
    Ok(())
}

fn row_id(row: &Value) -> String {
    match row.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "-".to_string(),
    }
}

/// Best human label for a row: title or name fields, then email.
fn row_label(row: &Value) -> String {
    let text = |key: &str| row.get(key).and_then(Value::as_str).filter(|s| !s.is_empty());

    for key in ["title", "name", "invoice_title", "account_name"] {
        if let Some(s) = text(key) {
            return s.to_string();
        }
    }
    let full: Vec<&str> = ["first_name", "last_name"].into_iter().filter_map(text).collect();
    if !full.is_empty() {
        return full.join(" ");
    }
    text("email")
        .or_else(|| text("primary_email"))
        .unwrap_or("-")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_resource_names() {
        assert_eq!(Kind::parse("leads").unwrap(), Kind::Lead);
        assert_eq!(Kind::parse("Opportunity").unwrap(), Kind::Opportunity);
        assert_eq!(Kind::parse("docs").unwrap(), Kind::Document);
        assert!(Kind::parse("widgets").is_err());
    }

    #[test]
    fn list_args_build_query() {
        let args = ListArgs {
            limit: Some(5),
            search: Some("acme".into()),
            filters: vec!["status=open".into(), "source = web".into()],
            ..Default::default()
        };
        let pairs = args.to_query().unwrap().to_pairs();
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert!(pairs.contains(&("search".to_string(), "acme".to_string())));
        assert!(pairs.contains(&("status".to_string(), "open".to_string())));
        assert!(pairs.contains(&("source".to_string(), "web".to_string())));

        let bad = ListArgs { filters: vec!["nope".into()], ..Default::default() };
        assert!(bad.to_query().is_err());
    }

    #[test]
    fn row_labels() {
        assert_eq!(row_label(&json!({"title": "Renewal", "name": "x"})), "Renewal");
        assert_eq!(row_label(&json!({"first_name": "Ada", "last_name": "Lovelace"})), "Ada Lovelace");
        assert_eq!(row_label(&json!({"title": "", "primary_email": "ada@example.com"})), "ada@example.com");
        assert_eq!(row_label(&json!({})), "-");
        assert_eq!(row_id(&json!({"id": 4})), "4");
        assert_eq!(row_id(&json!({"id": "a1"})), "a1");
    }

    #[test]
    fn form_json_must_be_object() {
        assert!(parse_object(r#"{"title": "x"}"#).is_ok());
        assert!(parse_object("[1, 2]").is_err());
        assert!(parse_object("{").is_err());
    }
}
