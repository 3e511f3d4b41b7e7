//! Renders poll results into the Markdown bodies posted on the pull request.
//!
//! Output must be byte-stable for identical input: the comment upsert
//! rewrites the same comment on every rerun and diff noise there is user
//! facing.

use std::fmt::Write as _;

use super::poll::{AverageScores, BatchHandle, PollResult, ScenarioResult};

/// Hidden marker keying the comment upsert. Any unique string works, it only
/// has to survive GitHub's rendering invisibly.
pub const COMMENT_MARKER: &str = "<!-- evalgate-report -->";

const FOOTER: &str =
    "<sub>🛠️ If you need to make changes, update your branch and rerun the workflow.</sub>\n";

/// The score channels scale differently on the wire: LLM judges score 0-3,
/// metadata extraction 0-1. Both render on a 0-100% scale.
#[derive(Debug, Clone, Copy)]
enum Channel {
    Llm,
    Metadata,
}

/// Body of the placeholder comment posted right after submission; replaced
/// by the report once the batch completes.
#[must_use]
pub fn ongoing_body(
    test_name: &str,
    vla_endpoint: &str,
    eval_type: &str,
    commit: Option<&str>,
) -> String {
    let mut body = format!(
        "{COMMENT_MARKER}\n### 🚀 Evaluation ongoing\n\
         - **Test name:** `{test_name}`\n\
         - **Agent endpoint:** `{vla_endpoint}`\n\
         - **Type:** `{eval_type}`\n"
    );
    if let Some(commit) = commit {
        let _ = writeln!(&mut body, "- **Commit:** `{commit}`");
    }

    body.push_str("\nResults will replace this comment once the batch completes.\n\n");
    body.push_str(FOOTER);
    body
}

/// Full report: batch identifiers, global averages, dashboard link and the
/// per-scenario table.
#[must_use]
pub fn report_body(handle: &BatchHandle, result: &PollResult, commit: Option<&str>) -> String {
    let mut body = format!(
        "{COMMENT_MARKER}\n### ✅ Evaluation results\n\
         - **User ID:** `{}`\n\
         - **Project ID:** `{}`\n\
         - **Batch ID:** `{}`\n",
        handle.user_id, handle.project_id, handle.batch_id
    );
    if let Some(commit) = commit {
        let _ = writeln!(&mut body, "- **Commit:** `{commit}`");
    }

    body.push('\n');
    let aggregate = result.results.average_scores.unwrap_or_default();
    let _ = writeln!(
        &mut body,
        "- **GPT global average:** {}",
        aggregate_cell(aggregate.openai, Channel::Llm)
    );
    let _ = writeln!(
        &mut body,
        "- **Ionos global average:** {}",
        aggregate_cell(aggregate.ionos, Channel::Llm)
    );
    let _ = writeln!(
        &mut body,
        "- **Metadata global average:** {}",
        aggregate_cell(aggregate.metadata, Channel::Metadata)
    );

    if let Some(url) = result.url.as_deref() {
        let _ = write!(&mut body, "\n🔗 [View results in dashboard]({url})\n");
    }

    body.push('\n');
    body.push_str(&scenario_table(&result.results.scenarios));
    body.push('\n');
    body.push_str(FOOTER);
    body
}

/// The per-scenario result table.
#[must_use]
pub fn scenario_table(scenarios: &[ScenarioResult]) -> String {
    let mut table = String::from(
        "| Scenario | Quality (GPT) | Quality (Ionos) | Metadata extraction |\n\
         | --- | --- | --- | --- |\n",
    );

    for scenario in scenarios {
        let name = scenario.name.as_deref().unwrap_or("Unnamed scenario");
        let scores = &scenario.average_scores;
        let _ = writeln!(
            &mut table,
            "| {} | {} | {} | {} |",
            sanitize(name),
            cell(scores.openai, Channel::Llm),
            cell(scores.ionos, Channel::Llm),
            cell(scores.metadata, Channel::Metadata),
        );
    }

    table
}

fn cell(score: Option<f64>, channel: Channel) -> String {
    match score {
        Some(score) => {
            let percent = percent(score, channel);
            format!("{} {percent}%", indicator(percent))
        }
        None => "⬜".to_string(),
    }
}

fn aggregate_cell(score: Option<f64>, channel: Channel) -> String {
    score.map_or_else(
        || "N/A".to_string(),
        |score| format!("{}%", percent(score, channel)),
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn percent(score: f64, channel: Channel) -> u32 {
    let ratio = match channel {
        Channel::Llm => score / 3.0,
        Channel::Metadata => score,
    };

    // Scores outside the documented ranges clamp instead of wrapping.
    (ratio * 100.0).round().clamp(0.0, 100.0) as u32
}

fn indicator(percent: u32) -> &'static str {
    match percent {
        0..=29 => "🟥",
        30..=70 => "🟧",
        _ => "🟩",
    }
}

// Raw scenario names come from user-authored fixtures; a pipe or newline in
// one would tear the table apart.
fn sanitize(name: &str) -> String {
    name.replace(['\n', '\r'], " ").replace('|', "\\|")
}
