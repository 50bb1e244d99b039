//! CTest to JUnit report conversion.
//!
//! CTest records each run under `Testing/<tag>/Test.xml`, where `<tag>` is
//! the first line of `Testing/TAG`. The converted report lands in
//! `<build>/surefire-reports/CTestResults.xml`, where JUnit-aware tooling
//! picks it up.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roxmltree::{Document, Node};
use thiserror::Error;

use crate::util::fs::read_first_line;

/// File name of the converted report.
pub const REPORT_FILE_NAME: &str = "CTestResults.xml";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Couldn't read ctest TAG file: {}", path.display())]
    Tag { path: PathBuf },

    #[error("ctest report does not exist: {}", path.display())]
    MissingReport { path: PathBuf },

    #[error("failed to parse ctest report {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: roxmltree::Error,
    },

    #[error("malformed ctest report: {0}")]
    Malformed(&'static str),
}

/// Outcome of a single test as recorded by CTest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    NotRun,
}

impl TestStatus {
    fn parse(status: &str) -> Self {
        match status {
            "failed" => TestStatus::Failed,
            "error" => TestStatus::Error,
            "notrun" => TestStatus::NotRun,
            _ => TestStatus::Passed,
        }
    }
}

#[derive(Debug, Clone)]
struct TestCase {
    name: String,
    classname: String,
    time: String,
    status: TestStatus,
    exit_code: String,
    exit_value: String,
    output: String,
}

/// Read the run tag from `<project>/Testing/TAG`.
pub fn read_tag(project_dir: &Path) -> Result<String> {
    let path = project_dir.join("Testing").join("TAG");
    let tag = read_first_line(&path)
        .with_context(|| format!("Couldn't read ctest TAG file: {}", path.display()))?
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty());
    tag.ok_or_else(|| ReportError::Tag { path }.into())
}

/// Convert the latest CTest run in `project_dir` into a JUnit report in `reports_dir`.
pub fn write_report(project_dir: &Path, reports_dir: &Path) -> Result<PathBuf> {
    let tag = read_tag(project_dir)?;
    let source = project_dir.join("Testing").join(&tag).join("Test.xml");
    if !source.is_file() {
        return Err(ReportError::MissingReport { path: source }.into());
    }
    let xml = fs::read_to_string(&source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    let junit = convert(&xml).map_err(|e| match e {
        ReportError::Parse { source: err, .. } => ReportError::Parse {
            path: source.clone(),
            source: err,
        },
        other => other,
    })?;

    fs::create_dir_all(reports_dir)
        .with_context(|| format!("failed to create directory: {}", reports_dir.display()))?;
    let dest = reports_dir.join(REPORT_FILE_NAME);
    fs::write(&dest, junit).with_context(|| format!("failed to write {}", dest.display()))?;
    tracing::debug!("Wrote test report to {}", dest.display());
    Ok(dest)
}

/// Transform a CTest `Test.xml` document into a JUnit `<testsuite>`.
pub fn convert(xml: &str) -> Result<String, ReportError> {
    let doc = Document::parse(xml).map_err(|source| ReportError::Parse {
        path: PathBuf::new(),
        source,
    })?;
    let site = doc.root_element();
    if !site.has_tag_name("Site") {
        return Err(ReportError::Malformed("root element is not <Site>"));
    }
    let testing = child(site, "Testing").ok_or(ReportError::Malformed("missing <Testing>"))?;

    let build_name = site.attribute("BuildName").unwrap_or("");
    let site_name = site.attribute("Name").unwrap_or("");
    let listed = child(testing, "TestList")
        .map(|list| list.children().filter(|n| n.has_tag_name("Test")).count())
        .unwrap_or(0);
    let cases: Vec<TestCase> = testing
        .children()
        .filter(|n| n.has_tag_name("Test"))
        .map(|test| test_case(test, build_name))
        .collect();

    let count = |status: TestStatus| cases.iter().filter(|c| c.status == status).count();

    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<testsuite name=\"{}\" hostname=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\">",
        escape(site_name),
        escape(site_name),
        listed,
        count(TestStatus::Failed),
        count(TestStatus::Error),
        count(TestStatus::NotRun),
    );
    for case in &cases {
        let _ = writeln!(
            out,
            "  <testcase name=\"{}\" classname=\"{}\" time=\"{}\">",
            escape(&case.name),
            escape(&case.classname),
            escape(&case.time),
        );
        match case.status {
            TestStatus::Failed => {
                let _ = writeln!(
                    out,
                    "    <failure message=\"{} ({})\">{}</failure>",
                    escape(&case.exit_code),
                    escape(&case.exit_value),
                    escape(&case.output),
                );
            }
            TestStatus::NotRun => out.push_str("    <skipped/>\n"),
            TestStatus::Passed | TestStatus::Error => {
                let _ = writeln!(out, "    <system-out>{}</system-out>", escape(&case.output));
            }
        }
        out.push_str("  </testcase>\n");
    }
    out.push_str("</testsuite>\n");
    Ok(out)
}

fn test_case(test: Node<'_, '_>, build_name: &str) -> TestCase {
    let path = child_text(test, "Path");
    let mut chars = path.chars();
    chars.next();
    let results = child(test, "Results");

    TestCase {
        name: child_text(test, "Name"),
        classname: format!("{}{}", build_name, chars.as_str()),
        time: results
            .and_then(|r| measurement(r, "Execution Time"))
            .unwrap_or_default(),
        status: TestStatus::parse(test.attribute("Status").unwrap_or("")),
        exit_code: results
            .and_then(|r| measurement(r, "Exit Code"))
            .unwrap_or_default(),
        exit_value: results
            .and_then(|r| measurement(r, "Exit Value"))
            .unwrap_or_default(),
        output: results
            .and_then(|r| child(r, "Measurement"))
            .map(|m| child_text(m, "Value"))
            .unwrap_or_default(),
    }
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.has_tag_name(name))
}

fn child_text(node: Node<'_, '_>, name: &str) -> String {
    child(node, name)
        .and_then(|n| n.text())
        .unwrap_or("")
        .to_string()
}

fn measurement(results: Node<'_, '_>, name: &str) -> Option<String> {
    results
        .children()
        .filter(|n| n.has_tag_name("NamedMeasurement"))
        .find(|n| n.attribute("name") == Some(name))
        .map(|n| child_text(n, "Value"))
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Not representable in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}
