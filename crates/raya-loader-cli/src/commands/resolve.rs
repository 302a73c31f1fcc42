//! `raya-loader resolve`: Resolve units and report the result.

use crate::output::StyledOutput;
use crate::setup::LoaderOptions;
use raya_loader::{LoadError, TransformingLoader, Unit};
use serde::Serialize;
use std::sync::Arc;
use termcolor::ColorChoice;

/// What resolving one name produced
#[derive(Debug, Serialize)]
pub struct UnitReport {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
pub struct ErrorReport {
    /// Underlying failure kind; a poisoned lookup reports what poisoned it
    pub kind: String,
    pub message: String,
}

impl UnitReport {
    pub fn from_result(name: &str, result: &Result<Arc<Unit>, LoadError>) -> Self {
        match result {
            Ok(unit) => {
                let provenance = unit.provenance();
                Self {
                    name: name.to_string(),
                    digest: Some(unit.digest_hex()),
                    size: Some(unit.bytes().len()),
                    namespace: unit.namespace().map(|ns| ns.name().to_string()),
                    origin: provenance.map(|p| p.origin().to_string()),
                    signers: provenance
                        .map(|p| p.signers().iter().map(|s| s.signer().to_string()).collect())
                        .unwrap_or_default(),
                    error: None,
                }
            }
            Err(e) => Self {
                name: name.to_string(),
                digest: None,
                size: None,
                namespace: None,
                origin: None,
                signers: Vec::new(),
                error: Some(ErrorReport {
                    kind: format!("{:?}", e.root_kind()),
                    message: e.to_string(),
                }),
            },
        }
    }
}

/// Resolve every name in order, one report per name.
pub fn reports(loader: &TransformingLoader, names: &[String]) -> Vec<UnitReport> {
    names
        .iter()
        .map(|name| UnitReport::from_result(name, &loader.resolve(name)))
        .collect()
}

pub fn render_json(reports: &[UnitReport]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(reports)
}

/// Resolve every name in order. Returns `false` if any failed.
pub fn execute(
    options: &LoaderOptions,
    names: &[String],
    json: bool,
    choice: ColorChoice,
) -> anyhow::Result<bool> {
    let (loader, _) = options.build()?;

    let reports = reports(&loader, names);
    let ok = reports.iter().all(|r| r.error.is_none());

    if json {
        println!("{}", render_json(&reports)?);
        return Ok(ok);
    }

    let mut out = StyledOutput::new(choice);
    for report in &reports {
        print_report(&mut out, report);
    }
    out.flush();
    Ok(ok)
}

fn print_report(out: &mut StyledOutput, report: &UnitReport) {
    if let Some(error) = &report.error {
        out.error("FAIL ");
        out.bold(&report.name);
        out.newline();
        out.field("kind", &error.kind);
        out.field("error", &error.message);
        return;
    }

    out.success("OK   ");
    out.bold(&report.name);
    out.newline();
    if let Some(digest) = &report.digest {
        out.field("sha256", digest);
    }
    if let Some(size) = report.size {
        out.field("size", &format!("{} bytes", size));
    }
    if let Some(namespace) = &report.namespace {
        out.field("namespace", namespace);
    }
    out.field("origin", report.origin.as_deref().unwrap_or("-"));
    if !report.signers.is_empty() {
        out.field("signers", &report.signers.join(", "));
    }
}
