use std::io::Write;
use std::path::Path;

use owo_colors::OwoColorize;
use periodica_core::{NormalizedRecord, SearchResults, SourceRegistry, SourceReport, SourceStatus};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

const ABSTRACT_PREVIEW_CHARS: usize = 200;

/// Print the result list with a one-line header describing the query.
pub fn print_results(
    w: &mut dyn Write,
    results: &SearchResults,
    color: ColorMode,
) -> std::io::Result<()> {
    let q = &results.query;
    let origin = if results.from_cache { " (cached)" } else { "" };
    let header = format!(
        "{} results for \"{}\" between {} and {}{}",
        results.records.len(),
        q.terms,
        q.start_date,
        q.end_date,
        origin
    );
    if color.enabled() {
        writeln!(w, "{}", header.bold())?;
    } else {
        writeln!(w, "{}", header)?;
    }
    writeln!(w)?;

    if results.records.is_empty() {
        writeln!(w, "No results.")?;
        return Ok(());
    }

    for (i, record) in results.records.iter().enumerate() {
        print_record(w, i + 1, record, color)?;
    }
    Ok(())
}

fn print_record(
    w: &mut dyn Write,
    index: usize,
    record: &NormalizedRecord,
    color: ColorMode,
) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}. {}", index, record.title.bold())?;
    } else {
        writeln!(w, "{}. {}", index, record.title)?;
    }
    if !record.authors.is_empty() {
        writeln!(w, "   {}", record.authors)?;
    }

    let mut meta = vec![record.publication_date.clone()];
    if !record.journal.is_empty() {
        meta.push(record.journal.clone());
    }
    meta.push(format!("via {}", record.source));
    let meta = meta.join(" | ");
    if color.enabled() {
        writeln!(w, "   {}", meta.dimmed())?;
    } else {
        writeln!(w, "   {}", meta)?;
    }

    let link = if record.doi.is_empty() {
        record.url.clone()
    } else {
        format!("https://doi.org/{}", record.doi)
    };
    if color.enabled() {
        writeln!(w, "   {}", link.cyan())?;
    } else {
        writeln!(w, "   {}", link)?;
    }

    if !record.r#abstract.is_empty() {
        let preview: String = record.r#abstract.chars().take(ABSTRACT_PREVIEW_CHARS).collect();
        let ellipsis = if record.r#abstract.chars().count() > ABSTRACT_PREVIEW_CHARS {
            "..."
        } else {
            ""
        };
        writeln!(w, "   {}{}", preview, ellipsis)?;
    }
    writeln!(w)?;
    Ok(())
}

/// Print per-source status lines.
pub fn print_reports(
    w: &mut dyn Write,
    reports: &[SourceReport],
    color: ColorMode,
) -> std::io::Result<()> {
    if reports.is_empty() {
        return Ok(());
    }
    writeln!(w, "Sources:")?;
    for report in reports {
        let status = match report.status {
            SourceStatus::Ok => "OK",
            SourceStatus::Failed => "FAILED",
            SourceStatus::Panicked => "PANICKED",
        };
        let status = if !color.enabled() {
            status.to_string()
        } else if report.status == SourceStatus::Ok {
            status.green().to_string()
        } else {
            status.red().to_string()
        };
        write!(
            w,
            "  {:<18} {} {} records in {:.2}s",
            report.source,
            status,
            report.records,
            report.elapsed.as_secs_f64()
        )?;
        match &report.error {
            Some(e) => writeln!(w, " ({})", e)?,
            None => writeln!(w)?,
        }
    }
    Ok(())
}

pub fn print_sources(
    w: &mut dyn Write,
    registry: &SourceRegistry,
    color: ColorMode,
) -> std::io::Result<()> {
    if registry.is_empty() {
        writeln!(w, "No sources enabled.")?;
        return Ok(());
    }
    for name in registry.names() {
        if color.enabled() {
            writeln!(w, "{}", name.green())?;
        } else {
            writeln!(w, "{}", name)?;
        }
    }
    Ok(())
}

pub fn print_sweep(
    w: &mut dyn Write,
    dir: &Path,
    removed: usize,
    color: ColorMode,
) -> std::io::Result<()> {
    let msg = format!("Removed {} expired entries from {}", removed, dir.display());
    if color.enabled() && removed > 0 {
        writeln!(w, "{}", msg.yellow())
    } else {
        writeln!(w, "{}", msg)
    }
}
