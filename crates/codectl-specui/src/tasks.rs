use codectl_core::is_docs_path;
use codectl_core::tasks::TaskItem;

/// Filter value that disables a field.
pub const ALL: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Status,
    Owner,
    Priority,
}

impl FilterField {
    pub fn label(self) -> &'static str {
        match self {
            FilterField::Status => "status",
            FilterField::Owner => "owner",
            FilterField::Priority => "priority",
        }
    }

    fn value(self, task: &TaskItem) -> &str {
        match self {
            FilterField::Status => &task.status,
            FilterField::Owner => &task.owner,
            FilterField::Priority => &task.priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFilter {
    pub status: String,
    pub owner: String,
    pub priority: String,
    pub search: String,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: ALL.to_string(),
            owner: ALL.to_string(),
            priority: ALL.to_string(),
            search: String::new(),
        }
    }
}

impl TaskFilter {
    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Status => &self.status,
            FilterField::Owner => &self.owner,
            FilterField::Priority => &self.priority,
        }
    }

    fn slot(&mut self, field: FilterField) -> &mut String {
        match field {
            FilterField::Status => &mut self.status,
            FilterField::Owner => &mut self.owner,
            FilterField::Priority => &mut self.priority,
        }
    }

    /// Advances `field` to the next option present in `tasks`, wrapping back
    /// to `All`. A value that no longer exists restarts from `All`.
    pub fn cycle(&mut self, field: FilterField, tasks: &[TaskItem]) {
        let options = filter_options(tasks, field);
        let current = self.get(field).to_string();
        let next = options
            .iter()
            .position(|option| option.eq_ignore_ascii_case(&current))
            .map(|idx| options[(idx + 1) % options.len()].clone())
            .unwrap_or_else(|| ALL.to_string());
        *self.slot(field) = next;
    }

    pub fn is_default(&self) -> bool {
        *self == TaskFilter::default()
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("status={}", self.status),
            format!("owner={}", self.owner),
            format!("priority={}", self.priority),
        ];
        if !self.search.trim().is_empty() {
            parts.push(format!("search={}", self.search.trim()));
        }
        parts.join("  ")
    }
}

/// `All` followed by the distinct non-empty values of `field`, compared
/// case-insensitively and sorted.
pub fn filter_options(tasks: &[TaskItem], field: FilterField) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for task in tasks {
        let value = field.value(task).trim();
        if value.is_empty() || values.iter().any(|seen| seen.eq_ignore_ascii_case(value)) {
            continue;
        }
        values.push(value.to_string());
    }
    values.sort_by_key(|value| value.to_lowercase());
    let mut options = vec![ALL.to_string()];
    options.extend(values);
    options
}

/// Indices of the tasks that pass the filter, in input order.
///
/// A selected document under the docs tree restricts the list to tasks that
/// reference it; field filters are case-insensitive exact matches; the
/// search text must appear in the title or file name.
pub fn apply_filter(tasks: &[TaskItem], selected_doc: Option<&str>, filter: &TaskFilter) -> Vec<usize> {
    let doc = selected_doc.filter(|doc| is_docs_path(doc));
    let search = filter.search.trim().to_lowercase();
    tasks
        .iter()
        .enumerate()
        .filter(|(_, task)| doc.map_or(true, |doc| task.is_related_to(doc)))
        .filter(|(_, task)| {
            [FilterField::Status, FilterField::Owner, FilterField::Priority]
                .into_iter()
                .all(|field| field_matches(filter.get(field), field.value(task)))
        })
        .filter(|(_, task)| {
            search.is_empty()
                || task.title.to_lowercase().contains(&search)
                || task.file_name.to_lowercase().contains(&search)
        })
        .map(|(idx, _)| idx)
        .collect()
}

fn field_matches(wanted: &str, actual: &str) -> bool {
    wanted.is_empty() || wanted == ALL || wanted.eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, status: &str, owner: &str, priority: &str, related: &[&str]) -> TaskItem {
        TaskItem {
            file_name: format!("{name}.task.mdx"),
            rel_path: format!("vibe-docs/task/{name}.task.mdx"),
            title: format!("Task {name}"),
            status: status.to_string(),
            owner: owner.to_string(),
            priority: priority.to_string(),
            related: related.iter().map(|doc| doc.to_string()).collect(),
            ..TaskItem::default()
        }
    }

    fn sample() -> Vec<TaskItem> {
        vec![
            task("c-login", "todo", "ana", "P1", &["vibe-docs/spec/login.spec.mdx"]),
            task("b-billing", "Done", "bo", "P2", &["vibe-docs/spec/billing.spec.mdx"]),
            task("a-audit", "todo", "bo", "P1", &[]),
        ]
    }

    #[test]
    fn default_filter_returns_input_order() {
        let tasks = sample();
        assert_eq!(apply_filter(&tasks, None, &TaskFilter::default()), vec![0, 1, 2]);
    }

    #[test]
    fn fields_match_case_insensitively() {
        let tasks = sample();
        let filter = TaskFilter {
            status: "TODO".to_string(),
            owner: "Bo".to_string(),
            ..TaskFilter::default()
        };
        assert_eq!(apply_filter(&tasks, None, &filter), vec![2]);
    }

    #[test]
    fn selected_doc_restricts_only_inside_docs_tree() {
        let tasks = sample();
        let filter = TaskFilter::default();
        assert_eq!(
            apply_filter(&tasks, Some("vibe-docs/spec/login.spec.mdx"), &filter),
            vec![0]
        );
        assert_eq!(apply_filter(&tasks, Some("src/main.rs"), &filter), vec![0, 1, 2]);
    }

    #[test]
    fn search_matches_title_or_file_name() {
        let tasks = sample();
        let filter = TaskFilter {
            search: "BILL".to_string(),
            ..TaskFilter::default()
        };
        assert_eq!(apply_filter(&tasks, None, &filter), vec![1]);
        let by_file = TaskFilter {
            search: "a-audit.task".to_string(),
            ..TaskFilter::default()
        };
        assert_eq!(apply_filter(&tasks, None, &by_file), vec![2]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let tasks = sample();
        let filter = TaskFilter {
            priority: "p1".to_string(),
            ..TaskFilter::default()
        };
        let first = apply_filter(&tasks, None, &filter);
        let subset: Vec<TaskItem> = first.iter().map(|idx| tasks[*idx].clone()).collect();
        let second = apply_filter(&subset, None, &filter);
        assert_eq!(second, (0..subset.len()).collect::<Vec<_>>());
        assert_eq!(first, vec![0, 2]);
    }

    #[test]
    fn cycling_walks_distinct_values_and_wraps() {
        let tasks = sample();
        assert_eq!(filter_options(&tasks, FilterField::Status), vec!["All", "Done", "todo"]);
        let mut filter = TaskFilter::default();
        filter.cycle(FilterField::Status, &tasks);
        assert_eq!(filter.status, "Done");
        filter.cycle(FilterField::Status, &tasks);
        assert_eq!(filter.status, "todo");
        filter.cycle(FilterField::Status, &tasks);
        assert_eq!(filter.status, ALL);

        filter.owner = "gone".to_string();
        filter.cycle(FilterField::Owner, &tasks);
        assert_eq!(filter.owner, ALL);
        assert!(filter.is_default());
    }
}
