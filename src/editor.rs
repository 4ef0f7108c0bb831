/*!
    Editing tasks as plain text in the user's editor.

    A draft looks like

    ```text
    [high] Write report
    Collect the numbers from last quarter.
    ```

    The bracketed priority is optional. The help block under the scissors
    line is dropped when the buffer is read back.
!*/
use std::fs;

use thiserror::Error;
use winnow::Parser;
use winnow::Result;
use winnow::ascii::{alpha1, multispace0, space0, till_line_ending};
use winnow::combinator::{delimited, opt, preceded, terminated};
use winnow::token::rest;

use crate::task::{NewTask, Priority, Task, TaskChanges, is_valid_title};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no editor configured")]
    NoEditor,
    #[error("can't run editor: {0}")]
    Io(#[from] std::io::Error),
    #[error("editor exited with {0}")]
    Failed(std::process::ExitStatus),
    #[error("can't read task: {0}")]
    Parse(String),
    #[error("the title must not be empty")]
    EmptyTitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub priority: Priority,
}

impl TaskDraft {
    pub fn into_new_task(self) -> NewTask {
        NewTask {
            title: self.title,
            description: self.description,
            priority: self.priority,
        }
    }

    /// Keeps the completion flag of the task being edited.
    pub fn into_changes(self, is_completed: bool) -> TaskChanges {
        TaskChanges {
            title: self.title,
            description: self.description,
            is_completed,
            priority: self.priority,
        }
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        TaskDraft {
            title: task.title.clone(),
            description: task.description.clone(),
            priority: task.priority,
        }
    }
}

const SCISSORS: &str = "# ------------------------ >8 ------------------------";

const HELP: &str = "\
# ------------------------ >8 ------------------------
# Do not modify or remove the line above.
# Everything below it is ignored.
# First line: [low|medium|high] Title
# Lines between the title and the line above are the description.
# Leave the title empty to abort.";

pub fn render_draft(draft: &TaskDraft) -> String {
    let mut text = format!("[{}] {}\n", draft.priority, draft.title);
    if !draft.description.is_empty() {
        text.push_str(&draft.description);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(HELP);
    text.push('\n');
    text
}

/// Parses an edited buffer. Everything from the scissors line down is
/// dropped; if that line was deleted, only the help lines themselves are.
pub fn read_draft(text: &str) -> std::result::Result<TaskDraft, EditorError> {
    let content = text
        .lines()
        .take_while(|line| line.trim_end() != SCISSORS)
        .filter(|line| !HELP.lines().any(|help| help == line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n");
    parse_draft
        .parse(content.as_str())
        .map_err(|e| EditorError::Parse(e.to_string()))
}

fn parse_draft(input: &mut &str) -> Result<TaskDraft> {
    multispace0.parse_next(input)?;
    let priority = opt(terminated(parse_priority_tag, space0)).parse_next(input)?;
    let title = till_line_ending.parse_next(input)?;
    let description = rest.parse_next(input)?;

    Ok(TaskDraft {
        title: title.trim().to_string(),
        description: description.trim().to_string(),
        priority: priority.unwrap_or_default(),
    })
}

fn parse_priority_tag(input: &mut &str) -> Result<Priority> {
    delimited(
        '[',
        preceded(space0, alpha1).try_map(str::parse::<Priority>),
        (space0, ']'),
    )
    .parse_next(input)
}

/// Opens `draft` in `editor` and returns what the user saved.
///
/// `editor` may carry arguments, e.g. `code --wait`.
pub async fn open_editor(
    editor: &str,
    draft: &TaskDraft,
) -> std::result::Result<TaskDraft, EditorError> {
    let mut words = editor.split_whitespace();
    let program = words.next().ok_or(EditorError::NoEditor)?;

    let file = tempfile::Builder::new()
        .prefix("taskboard-")
        .suffix(".txt")
        .tempfile()?;
    fs::write(file.path(), render_draft(draft))?;

    let status = tokio::process::Command::new(program)
        .args(words)
        .arg(file.path())
        .status()
        .await?;
    if !status.success() {
        return Err(EditorError::Failed(status));
    }

    let edited = read_draft(&fs::read_to_string(file.path())?)?;
    if !is_valid_title(&edited.title) {
        return Err(EditorError::EmptyTitle);
    }
    Ok(edited)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tag_test() {
        let mut input = "[high] rest";
        let res = parse_priority_tag(&mut input);
        assert_eq!(res.unwrap(), Priority::High);
        assert_eq!(input, " rest");
    }

    #[test]
    fn unknown_tag_stays_in_title() {
        let draft = read_draft("[draft] Write report").unwrap();
        assert_eq!(draft.title, "[draft] Write report");
        assert_eq!(draft.priority, Priority::Medium);
    }

    #[test]
    fn simple_parse_test() {
        let input = r#"

            [ Low ] Write report
            Collect the numbers.
            Then send it.
            "#;

        let draft = read_draft(input).unwrap();
        assert_eq!(draft.title, "Write report");
        assert_eq!(draft.priority, Priority::Low);
        assert!(draft.description.starts_with("Collect the numbers."));
        assert!(draft.description.ends_with("Then send it."));
    }

    #[test]
    fn untagged_title_defaults_to_medium() {
        let draft = read_draft("Buy milk").unwrap();
        assert_eq!(
            draft,
            TaskDraft {
                title: "Buy milk".to_string(),
                description: String::new(),
                priority: Priority::Medium,
            }
        );
    }

    #[test]
    fn rendered_draft_reads_back() {
        let draft = TaskDraft {
            title: "Write report".to_string(),
            description: "line one\nline two".to_string(),
            priority: Priority::High,
        };
        assert_eq!(read_draft(&render_draft(&draft)).unwrap(), draft);
    }

    #[test]
    fn markdown_headings_in_description_survive() {
        let draft = TaskDraft {
            title: "Write report".to_string(),
            description: "# Numbers\nfrom last quarter\n## Sources\n#hashtag".to_string(),
            priority: Priority::High,
        };
        assert_eq!(read_draft(&render_draft(&draft)).unwrap(), draft);
    }

    #[test]
    fn text_below_scissors_is_ignored() {
        let input = format!("Write report\n# kept\n{SCISSORS}\nnot kept\n");
        let draft = read_draft(&input).unwrap();
        assert_eq!(draft.title, "Write report");
        assert_eq!(draft.description, "# kept");
    }

    #[test]
    fn help_is_dropped_without_scissors() {
        let rendered = render_draft(&TaskDraft {
            title: "Write report".to_string(),
            description: "# Numbers".to_string(),
            priority: Priority::Low,
        });
        let input = rendered.replace(&format!("{SCISSORS}\n"), "");
        let draft = read_draft(&input).unwrap();
        assert_eq!(draft.description, "# Numbers");
    }

    #[test]
    fn comments_only_gives_empty_title() {
        let draft = read_draft(HELP).unwrap();
        assert!(draft.title.is_empty());
    }

    #[tokio::test]
    async fn failing_editor_is_an_error() {
        let res = open_editor("false", &TaskDraft::default()).await;
        assert!(matches!(res, Err(EditorError::Failed(_))));
    }

    #[tokio::test]
    async fn untouched_draft_comes_back() {
        let draft = TaskDraft {
            title: "Write report".to_string(),
            description: String::new(),
            priority: Priority::Low,
        };
        assert_eq!(open_editor("true", &draft).await.unwrap(), draft);
    }
}
