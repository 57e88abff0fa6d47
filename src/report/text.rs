use crate::pipeline::Report;
use anyhow::Result;
use std::fmt::Write;

const MAX_ALIGNMENT_ROWS: usize = 25;

pub fn render(report: &Report) -> Result<String> {
    let mut output = String::new();

    writeln!(&mut output, "Plasticome Analysis Report")?;
    writeln!(&mut output, "==========================")?;
    writeln!(&mut output)?;

    match report {
        Report::Positive {
            findings,
            categories,
            alignments,
            artifacts,
        } => {
            writeln!(
                &mut output,
                "The analysis points to enzymes that may degrade plastics."
            )?;
            writeln!(&mut output)?;

            writeln!(&mut output, "Candidate Enzymes")?;
            writeln!(&mut output, "-----------------")?;
            for finding in findings {
                writeln!(
                    &mut output,
                    "  {} [{}] -> {}",
                    finding.protein_id,
                    finding.labels.join(", "),
                    finding.plastics.join(", ")
                )?;
            }
            writeln!(&mut output)?;

            if !alignments.is_empty() {
                writeln!(&mut output, "Similarity to Reference Enzymes")?;
                writeln!(&mut output, "-------------------------------")?;
                for row in alignments.iter().take(MAX_ALIGNMENT_ROWS) {
                    writeln!(
                        &mut output,
                        "  {:<24} {:<24} {:>6.2}%  {}",
                        row.query_id, row.reference_id, row.identity, row.reference_name
                    )?;
                }
                if alignments.len() > MAX_ALIGNMENT_ROWS {
                    writeln!(
                        &mut output,
                        "  ... and {} more",
                        alignments.len() - MAX_ALIGNMENT_ROWS
                    )?;
                }
                writeln!(&mut output)?;
            }

            writeln!(&mut output, "Plastic types tested: {}", categories.join(", "))?;
            if let Some(table) = &artifacts.alignment_table {
                writeln!(&mut output, "Alignment table: {}", table.display())?;
            }
            writeln!(&mut output)?;
            writeln!(&mut output, "These results are indicative only.")?;
        }
        Report::Negative { message, .. } => {
            writeln!(&mut output, "{}", message)?;
        }
    }

    Ok(output)
}
