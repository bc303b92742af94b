//! HTML fragments for the correction pages and the admin task screens.

use super::types::{SiteMessage, SiteMessageLevel};
use crate::forms::{Question, Step};
use crate::service::history::ResolvedHistoryEntry;
use crate::store::{ResponseCorrection, StateControllerConfig};
use crate::workflow::WorkflowState;

/// Minimal HTML escaping for interpolated values.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Terminal message page; the only navigation offered is the back link.
pub fn site_message_page(message: &SiteMessage) -> String {
    let class = match message.level {
        SiteMessageLevel::Stop => "site-message site-message-stop",
        SiteMessageLevel::Info => "site-message site-message-info",
    };
    let back = message
        .url_return
        .as_deref()
        .map(|url| format!("<p><a href=\"{}\">Back</a></p>\n", escape(url)))
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html>\n<body>\n<div class=\"{class}\">\n<h1>{title}</h1>\n<p>{text}</p>\n{back}</div>\n</body>\n</html>\n",
        class = class,
        title = escape(message.title),
        text = escape(message.text),
        back = back,
    )
}

pub fn error_page() -> String {
    "<!doctype html>\n<html>\n<body>\n<div class=\"site-message site-message-stop\">\n<h1>Technical error</h1>\n<p>An unexpected error occurred. Please try again later.</p>\n</div>\n</body>\n</html>\n"
        .to_string()
}

fn step_tree(steps: &[(Step, Vec<Question>)], editable: bool) -> String {
    let mut out = String::new();
    for (step, questions) in steps {
        out.push_str(&format!(
            "<fieldset class=\"step\" data-step=\"{}\">\n<legend>{}</legend>\n",
            step.id,
            escape(&step.title)
        ));
        for question in questions {
            out.push_str(&format!(
                "<div class=\"question\" data-question=\"{}\" data-iteration=\"{}\">\n<label>{}</label>\n",
                question.id,
                question.iteration_number,
                escape(&question.title)
            ));
            if editable {
                out.push_str(&format!(
                    "<input type=\"text\" name=\"answer_{}_{}\" />\n",
                    question.id, question.iteration_number
                ));
            }
            out.push_str("</div>\n");
        }
        out.push_str("</fieldset>\n");
    }
    out
}

/// The front-office correction page: the step/question display tree filtered
/// to the questions flagged for correction.
pub fn correction_page(
    title: &str,
    correction: &ResponseCorrection,
    steps: &[(Step, Vec<Question>)],
) -> String {
    let message = correction
        .message
        .as_deref()
        .map(|m| format!("<p class=\"edit-message\">{}</p>\n", escape(m)))
        .unwrap_or_default();
    let status = if correction.is_complete() {
        "<p class=\"edit-complete\">The correction has been recorded.</p>\n".to_string()
    } else {
        String::new()
    };
    format!(
        "<!doctype html>\n<html>\n<body>\n<h1>{title}</h1>\n{message}{status}<form method=\"post\" id=\"edit_response\">\n{tree}</form>\n</body>\n</html>\n",
        title = escape(title),
        message = message,
        status = status,
        tree = step_tree(steps, !correction.is_complete()),
    )
}

/// Admin fragment: the task configuration editor.
pub fn config_form(
    id_task: i64,
    config: Option<&StateControllerConfig>,
    states: &[WorkflowState],
) -> String {
    let mut options = String::new();
    for state in states {
        options.push_str(&format!(
            "<option value=\"{}\">{}</option>\n",
            state.id,
            escape(&state.name)
        ));
    }
    let (eligible, target) = config
        .map(|c| (c.id_eligible_state.to_string(), c.id_target_state.to_string()))
        .unwrap_or_default();
    format!(
        "<form id=\"config\" data-task=\"{id_task}\">\n<label>Eligible state</label>\n<select name=\"id_eligible_state\" data-current=\"{eligible}\" class=\"list_states\">\n{options}</select>\n<label>Target state</label>\n<select name=\"id_target_state\" data-current=\"{target}\" class=\"list_states\">\n{options}</select>\n</form>\n",
        id_task = id_task,
        eligible = eligible,
        target = target,
        options = options,
    )
}

/// Admin fragment: preview of the form the end user will see.
pub fn task_form(steps: &[(Step, Vec<Question>)]) -> String {
    format!(
        "<div class=\"task-form\">\n{}</div>\n",
        step_tree(steps, false)
    )
}

/// Admin fragment: completion information, including the audit history once
/// the correction is complete.
pub fn task_information(
    config: Option<&StateControllerConfig>,
    correction: Option<&ResponseCorrection>,
    entries: &[Question],
    history: &[ResolvedHistoryEntry],
) -> String {
    let mut out = String::from("<div class=\"task-information\">\n");
    if let Some(config) = config {
        out.push_str(&format!(
            "<div id=\"config\" data-eligible-state=\"{}\" data-target-state=\"{}\"></div>\n",
            config.id_eligible_state, config.id_target_state
        ));
    }
    match correction {
        None => out.push_str("<p>No correction has been requested.</p>\n"),
        Some(correction) => {
            out.push_str(&format!(
                "<div id=\"edit_response\" data-complete=\"{}\">\n",
                correction.is_complete()
            ));
            if let Some(message) = correction.message.as_deref() {
                out.push_str(&format!("<p>{}</p>\n", escape(message)));
            }
            out.push_str("<ul class=\"list_entries\">\n");
            for entry in entries {
                out.push_str(&format!("<li>{}</li>\n", escape(&entry.title)));
            }
            out.push_str("</ul>\n</div>\n");

            if correction.is_complete() {
                out.push_str("<table class=\"list_history\">\n");
                for row in history {
                    out.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td></tr>\n",
                        escape(&row.question.title),
                        escape(&row.new_value)
                    ));
                }
                out.push_str("</table>\n");
            }
        }
    }
    out.push_str("</div>\n");
    out
}
