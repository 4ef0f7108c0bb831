use chrono::Local;
use color_eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, List, ListItem, ListState, Paragraph};
use ratatui::{DefaultTerminal, Frame};

use crate::client::{ClientError, TaskClient};
use crate::editor::{TaskDraft, open_editor};
use crate::task::{Priority, Task};

/// Which tasks the list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    All,
    Open,
    Done,
}

impl Filter {
    fn next(self) -> Self {
        match self {
            Filter::All => Filter::Open,
            Filter::Open => Filter::Done,
            Filter::Done => Filter::All,
        }
    }

    fn shows(self, task: &Task) -> bool {
        match self {
            Filter::All => true,
            Filter::Open => !task.is_completed,
            Filter::Done => task.is_completed,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Open => "open",
            Filter::Done => "done",
        }
    }
}

#[derive(Debug, Default)]
pub struct TaskList {
    items: Vec<Task>,
    list_state: ListState,
}

impl TaskList {
    fn set(&mut self, items: Vec<Task>) {
        self.items = items;
        self.clamp_selection();
    }

    fn selected(&self) -> Option<usize> {
        self.list_state.selected().filter(|&i| i < self.items.len())
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let i = self.selected().map_or(0, |i| (i + 1) % self.items.len());
        self.list_state.select(Some(i));
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let len = self.items.len();
        let i = self.selected().map_or(len - 1, |i| (i + len - 1) % len);
        self.list_state.select(Some(i));
    }

    fn clamp_selection(&mut self) {
        let selected = match (self.items.len(), self.list_state.selected()) {
            (0, _) => None,
            (len, Some(i)) => Some(i.min(len - 1)),
            (_, None) => Some(0),
        };
        self.list_state.select(selected);
    }
}

/// Open and done tasks across all filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Counts {
    open: usize,
    done: usize,
}

impl Counts {
    fn of(tasks: &[Task]) -> Self {
        let done = tasks.iter().filter(|t| t.is_completed).count();
        Counts {
            open: tasks.len() - done,
            done,
        }
    }

    fn add(&mut self, task: &Task) {
        if task.is_completed {
            self.done += 1;
        } else {
            self.open += 1;
        }
    }

    fn remove(&mut self, task: &Task) {
        if task.is_completed {
            self.done = self.done.saturating_sub(1);
        } else {
            self.open = self.open.saturating_sub(1);
        }
    }
}

pub struct App {
    client: TaskClient,
    editor: String,
    filter: Filter,
    task_list: TaskList,
    counts: Counts,
    /// Id of the task waiting for a y/n answer before it is deleted.
    pending_delete: Option<i64>,
    status: Option<String>,
    exit: bool,
}

pub async fn run(client: TaskClient, editor: String, filter: Filter) -> Result<()> {
    let mut app = App::new(client, editor, filter);
    app.reload().await;

    let mut terminal = ratatui::init();
    let res = app.event_loop(&mut terminal).await;
    ratatui::restore();
    res
}

impl App {
    pub fn new(client: TaskClient, editor: String, filter: Filter) -> Self {
        App {
            client,
            editor,
            filter,
            task_list: TaskList::default(),
            counts: Counts::default(),
            pending_delete: None,
            status: None,
            exit: false,
        }
    }

    async fn event_loop(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        while !self.exit {
            terminal.draw(|frame| self.render(frame))?;
            if let Event::Key(key) = tokio::task::spawn_blocking(event::read).await?? {
                if key.kind == KeyEventKind::Press {
                    self.handle_key(key, terminal).await?;
                }
            }
        }
        Ok(())
    }

    async fn handle_key(&mut self, key: KeyEvent, terminal: &mut DefaultTerminal) -> Result<()> {
        if let Some(id) = self.pending_delete.take() {
            self.answer_delete(id, key.code).await;
            return Ok(());
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.exit = true,
            KeyCode::Char('j') | KeyCode::Down => self.task_list.next(),
            KeyCode::Char('k') | KeyCode::Up => self.task_list.previous(),
            KeyCode::Char(' ') => self.toggle_selected().await,
            KeyCode::Char('d') => self.request_delete(),
            KeyCode::Char('f') => {
                self.filter = self.filter.next();
                self.reload().await;
            }
            KeyCode::Char('r') => self.reload().await,
            KeyCode::Char('a') => {
                let draft = suspended(terminal, self.editor.clone(), TaskDraft::default()).await?;
                if let Some(draft) = draft {
                    self.add(draft).await;
                }
            }
            KeyCode::Char('e') => {
                let Some(i) = self.task_list.selected() else {
                    return Ok(());
                };
                let task = self.task_list.items[i].clone();
                let draft = suspended(terminal, self.editor.clone(), TaskDraft::from(&task)).await?;
                if let Some(draft) = draft {
                    self.edit(task, draft).await;
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn reload(&mut self) {
        match self.fetch().await {
            Ok((tasks, counts)) => {
                self.task_list.set(tasks);
                self.counts = counts;
                self.status = None;
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    /// The rows for the current filter plus the counts over every task.
    async fn fetch(&self) -> Result<(Vec<Task>, Counts), ClientError> {
        if self.filter == Filter::All {
            let tasks = self.client.list().await?;
            let counts = Counts::of(&tasks);
            return Ok((tasks, counts));
        }
        let (open, done) = tokio::try_join!(
            self.client.list_by_status(false),
            self.client.list_by_status(true)
        )?;
        let counts = Counts {
            open: open.len(),
            done: done.len(),
        };
        let tasks = if self.filter == Filter::Open { open } else { done };
        Ok((tasks, counts))
    }

    fn request_delete(&mut self) {
        let Some(i) = self.task_list.selected() else {
            return;
        };
        let task = &self.task_list.items[i];
        self.pending_delete = Some(task.id);
        self.status = Some(format!("delete #{} \"{}\"? (y/n)", task.id, task.title));
    }

    async fn answer_delete(&mut self, id: i64, answer: KeyCode) {
        let still_selected = self
            .task_list
            .selected()
            .is_some_and(|i| self.task_list.items[i].id == id);
        if matches!(answer, KeyCode::Char('y') | KeyCode::Char('Y')) && still_selected {
            self.delete_selected().await;
        } else {
            self.status = Some(format!("kept #{id}"));
        }
    }

    /// Flips completion locally, then asks the server. The local row is
    /// put back if the request fails.
    async fn toggle_selected(&mut self) {
        let Some(i) = self.task_list.selected() else {
            return;
        };
        let previous = self.task_list.items[i].clone();
        let changes = previous.changes().completed(!previous.is_completed);

        let optimistic = &mut self.task_list.items[i];
        optimistic.is_completed = changes.is_completed;
        optimistic.completed_at = changes
            .is_completed
            .then(|| Local::now().naive_local());

        match self.client.update(previous.id, &changes).await {
            Ok(Some(task)) => {
                self.counts.remove(&previous);
                self.counts.add(&task);
                self.settle(i, task);
            }
            Ok(None) => {
                self.task_list.items.remove(i);
                self.task_list.clamp_selection();
                self.counts.remove(&previous);
                self.status = Some(format!("task #{} no longer exists", previous.id));
            }
            Err(e) => {
                self.task_list.items[i] = previous;
                self.status = Some(e.to_string());
            }
        }
    }

    /// Removes the row right away, restoring it if the server refuses.
    async fn delete_selected(&mut self) {
        let Some(i) = self.task_list.selected() else {
            return;
        };
        let removed = self.task_list.items.remove(i);
        self.task_list.clamp_selection();

        match self.client.delete(removed.id).await {
            Ok(_) => {
                self.counts.remove(&removed);
                self.status = Some(format!("deleted #{}", removed.id));
            }
            Err(e) => {
                self.task_list.items.insert(i, removed);
                self.task_list.list_state.select(Some(i));
                self.status = Some(e.to_string());
            }
        }
    }

    async fn add(&mut self, draft: TaskDraft) {
        match self.client.create(&draft.into_new_task()).await {
            Ok(task) => {
                self.counts.add(&task);
                self.status = Some(format!("created #{}", task.id));
                if self.filter.shows(&task) {
                    self.task_list.items.insert(0, task);
                    self.task_list.list_state.select(Some(0));
                }
            }
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    async fn edit(&mut self, task: Task, draft: TaskDraft) {
        let changes = draft.into_changes(task.is_completed);
        match self.client.update(task.id, &changes).await {
            Ok(Some(updated)) => {
                if let Some(i) = self.task_list.items.iter().position(|t| t.id == task.id) {
                    self.settle(i, updated);
                }
            }
            Ok(None) => self.status = Some(format!("task #{} no longer exists", task.id)),
            Err(e) => self.status = Some(e.to_string()),
        }
    }

    /// Replaces row `i` with the server's copy, dropping it if it no longer
    /// matches the filter.
    fn settle(&mut self, i: usize, task: Task) {
        if self.filter.shows(&task) {
            self.task_list.items[i] = task;
        } else {
            self.task_list.items.remove(i);
            self.task_list.clamp_selection();
        }
    }

    fn title(&self) -> String {
        format!(
            " tasks: {} ({})  open {}  done {} ",
            self.filter.label(),
            self.task_list.items.len(),
            self.counts.open,
            self.counts.done,
        )
    }

    fn render(&mut self, frame: &mut Frame) {
        let [list_area, footer_area] =
            Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

        let items: Vec<ListItem> = self.task_list.items.iter().map(task_item).collect();
        let list = List::new(items)
            .block(Block::bordered().title(self.title()))
            .highlight_style(Style::new().add_modifier(Modifier::REVERSED))
            .highlight_symbol("> ");
        frame.render_stateful_widget(list, list_area, &mut self.task_list.list_state);

        let footer = match &self.status {
            Some(status) => Line::from(status.as_str()).yellow(),
            None => Line::from(
                "space toggle  a add  e edit  d delete  f filter  r reload  q quit",
            )
            .dark_gray(),
        };
        frame.render_widget(Paragraph::new(footer), footer_area);
    }
}

fn task_item(task: &Task) -> ListItem<'static> {
    let mark = if task.is_completed { "[x] " } else { "[ ] " };
    let priority = match task.priority {
        Priority::High => Span::from("high  ").red(),
        Priority::Medium => Span::from("medium").yellow(),
        Priority::Low => Span::from("low   ").green(),
    };
    let title = if task.is_completed {
        Span::from(task.title.clone()).crossed_out().dark_gray()
    } else {
        Span::from(task.title.clone())
    };
    ListItem::new(Line::from(vec![
        Span::from(mark),
        priority,
        Span::from(" "),
        title,
    ]))
}

/// Hands the terminal to the editor and takes it back afterwards. Editor
/// failures are reported, not fatal.
async fn suspended(
    terminal: &mut DefaultTerminal,
    editor: String,
    draft: TaskDraft,
) -> Result<Option<TaskDraft>> {
    ratatui::restore();
    let res = open_editor(&editor, &draft).await;
    *terminal = ratatui::init();
    terminal.clear()?;
    match res {
        Ok(draft) => Ok(Some(draft)),
        Err(e) => {
            tracing::debug!(error = %e, "editing aborted");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::client::tests::spawn_server;
    use crate::task::NewTask;

    fn task(id: i64, is_completed: bool) -> Task {
        let created_at = NaiveDate::from_ymd_opt(2025, 8, 6)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Task {
            id,
            title: format!("task {id}"),
            description: String::new(),
            is_completed,
            created_at,
            completed_at: is_completed.then_some(created_at),
            priority: Priority::Medium,
        }
    }

    #[test]
    fn test_navigation_wraps() {
        let mut list = TaskList::default();
        list.set(vec![task(3, false), task(2, false), task(1, true)]);
        assert_eq!(list.selected(), Some(0));
        list.previous();
        assert_eq!(list.selected(), Some(2));
        list.next();
        assert_eq!(list.selected(), Some(0));
    }

    #[test]
    fn test_selection_clamps_after_shrinking() {
        let mut list = TaskList::default();
        list.set(vec![task(2, false), task(1, false)]);
        list.next();
        list.set(vec![task(2, false)]);
        assert_eq!(list.selected(), Some(0));
        list.set(vec![]);
        assert_eq!(list.selected(), None);
    }

    #[test]
    fn test_filter_cycle() {
        assert_eq!(Filter::All.next(), Filter::Open);
        assert_eq!(Filter::Open.next(), Filter::Done);
        assert_eq!(Filter::Done.next(), Filter::All);
        assert!(Filter::Open.shows(&task(1, false)));
        assert!(!Filter::Open.shows(&task(1, true)));
        assert!(Filter::Done.shows(&task(1, true)));
    }

    async fn app_with(titles: &[&str], filter: Filter) -> App {
        let client = spawn_server().await;
        for title in titles {
            client
                .create(&NewTask {
                    title: title.to_string(),
                    description: String::new(),
                    priority: Priority::Medium,
                })
                .await
                .unwrap();
        }
        let mut app = App::new(client, "true".to_string(), filter);
        app.reload().await;
        app
    }

    #[tokio::test]
    async fn test_toggle_settles_with_server_copy() {
        let mut app = app_with(&["a"], Filter::All).await;
        app.toggle_selected().await;

        let row = &app.task_list.items[0];
        assert!(row.is_completed);
        assert!(row.completed_at.is_some());
        assert_eq!(app.client.get(row.id).await.unwrap().as_ref(), Some(row));
        assert_eq!(app.status, None);
    }

    #[tokio::test]
    async fn test_toggle_drops_row_leaving_filter() {
        let mut app = app_with(&["a", "b"], Filter::Open).await;
        app.toggle_selected().await;

        assert_eq!(app.task_list.items.len(), 1);
        assert_eq!(app.task_list.items[0].title, "a");
    }

    #[tokio::test]
    async fn test_toggle_of_vanished_task_removes_row() {
        let mut app = app_with(&["a"], Filter::All).await;
        app.client.delete(1).await.unwrap();
        app.toggle_selected().await;

        assert!(app.task_list.items.is_empty());
        assert!(app.status.is_some());
    }

    #[tokio::test]
    async fn test_failed_toggle_restores_row() {
        let mut app = app_with(&[], Filter::All).await;
        app.client = TaskClient::new("http://127.0.0.1:9/api/tasks");
        app.task_list.set(vec![task(1, false)]);

        app.toggle_selected().await;
        assert_eq!(app.task_list.items, vec![task(1, false)]);
        assert!(app.status.is_some());
    }

    #[tokio::test]
    async fn test_failed_delete_restores_row() {
        let mut app = app_with(&[], Filter::All).await;
        app.client = TaskClient::new("http://127.0.0.1:9/api/tasks");
        app.task_list.set(vec![task(2, false), task(1, false)]);
        app.task_list.next();

        app.delete_selected().await;
        assert_eq!(app.task_list.items, vec![task(2, false), task(1, false)]);
        assert_eq!(app.task_list.selected(), Some(1));
    }

    #[test]
    fn test_counts() {
        let mut counts = Counts::of(&[task(3, false), task(2, true), task(1, false)]);
        assert_eq!(counts, Counts { open: 2, done: 1 });
        counts.remove(&task(2, true));
        counts.add(&task(4, false));
        assert_eq!(counts, Counts { open: 3, done: 0 });
    }

    #[tokio::test]
    async fn test_title_counts_every_task_under_filter() {
        let mut app = app_with(&["a", "b", "c"], Filter::All).await;
        app.toggle_selected().await;
        assert_eq!(app.title(), " tasks: all (3)  open 2  done 1 ");

        app.filter = Filter::Done;
        app.reload().await;
        assert_eq!(app.task_list.items.len(), 1);
        assert_eq!(app.title(), " tasks: done (1)  open 2  done 1 ");

        app.toggle_selected().await;
        assert_eq!(app.title(), " tasks: done (0)  open 3  done 0 ");
    }

    #[tokio::test]
    async fn test_delete_waits_for_yes() {
        let mut app = app_with(&["a", "b"], Filter::All).await;
        app.request_delete();
        let id = app.pending_delete.expect("delete awaits an answer");
        assert_eq!(app.task_list.items.len(), 2);

        app.answer_delete(id, KeyCode::Char('n')).await;
        assert_eq!(app.task_list.items.len(), 2);
        assert_eq!(app.client.list().await.unwrap().len(), 2);
        assert_eq!(app.status, Some(format!("kept #{id}")));

        app.request_delete();
        app.answer_delete(id, KeyCode::Char('y')).await;
        assert_eq!(app.task_list.items.len(), 1);
        assert_eq!(app.client.get(id).await.unwrap(), None);
        assert_eq!(app.counts, Counts { open: 1, done: 0 });
    }

    #[tokio::test]
    async fn test_delete_answer_ignored_after_selection_moved() {
        let mut app = app_with(&["a", "b"], Filter::All).await;
        app.request_delete();
        let id = app.pending_delete.unwrap();
        app.task_list.next();

        app.answer_delete(id, KeyCode::Char('y')).await;
        assert_eq!(app.task_list.items.len(), 2);
        assert!(app.client.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_and_add() {
        let mut app = app_with(&["a", "b"], Filter::All).await;
        app.delete_selected().await;
        assert_eq!(app.task_list.items.len(), 1);
        assert_eq!(app.client.list().await.unwrap().len(), 1);

        app.add(TaskDraft {
            title: "c".to_string(),
            description: String::new(),
            priority: Priority::High,
        })
        .await;
        assert_eq!(app.task_list.items[0].title, "c");
        assert_eq!(app.task_list.selected(), Some(0));
    }
}
