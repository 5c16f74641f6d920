use crate::domain::{Event, EventBus};
use once_cell::sync::Lazy;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Hard cap on retained history entries. The oldest entry is evicted first.
const HISTORY_CAP: usize = 1000;

/// Upper bound on suggestions returned for a single query.
const SUGGEST_LIMIT: usize = 10;

/// One entry in the command catalog, used for help text and suggestions.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
}

/// Built-in catalog of common shell commands, in display order.
pub static COMMAND_CATALOG: Lazy<Vec<CommandSpec>> = Lazy::new(|| {
    vec![
        CommandSpec { name: "ls", description: "List directory contents", category: "navigation", usage: "ls [options] [path]" },
        CommandSpec { name: "cd", description: "Change the current directory", category: "navigation", usage: "cd [path]" },
        CommandSpec { name: "pwd", description: "Print the working directory", category: "navigation", usage: "pwd" },
        CommandSpec { name: "mkdir", description: "Create directories", category: "file", usage: "mkdir [options] <dir>" },
        CommandSpec { name: "rmdir", description: "Remove empty directories", category: "file", usage: "rmdir <dir>" },
        CommandSpec { name: "rm", description: "Remove files or directories", category: "file", usage: "rm [options] <path>" },
        CommandSpec { name: "cp", description: "Copy files or directories", category: "file", usage: "cp [options] <src> <dst>" },
        CommandSpec { name: "mv", description: "Move or rename files", category: "file", usage: "mv <src> <dst>" },
        CommandSpec { name: "find", description: "Search for files", category: "file", usage: "find <path> [expression]" },
        CommandSpec { name: "grep", description: "Search text with patterns", category: "file", usage: "grep [options] <pattern> [file]" },
        CommandSpec { name: "cat", description: "Print file contents", category: "file", usage: "cat <file>" },
        CommandSpec { name: "head", description: "Print the first lines of a file", category: "file", usage: "head [options] <file>" },
        CommandSpec { name: "tail", description: "Print the last lines of a file", category: "file", usage: "tail [options] <file>" },
        CommandSpec { name: "less", description: "Page through a file", category: "file", usage: "less <file>" },
        CommandSpec { name: "more", description: "Page through a file", category: "file", usage: "more <file>" },
        CommandSpec { name: "vim", description: "Edit a file with vim", category: "editor", usage: "vim <file>" },
        CommandSpec { name: "nano", description: "Edit a file with nano", category: "editor", usage: "nano <file>" },
        CommandSpec { name: "chmod", description: "Change file permissions", category: "permissions", usage: "chmod <mode> <path>" },
        CommandSpec { name: "chown", description: "Change file ownership", category: "permissions", usage: "chown <owner> <path>" },
        CommandSpec { name: "ps", description: "List running processes", category: "process", usage: "ps [options]" },
        CommandSpec { name: "top", description: "Interactive process monitor", category: "process", usage: "top" },
        CommandSpec { name: "htop", description: "Interactive process viewer", category: "process", usage: "htop" },
        CommandSpec { name: "kill", description: "Send a signal to a process", category: "process", usage: "kill [signal] <pid>" },
        CommandSpec { name: "systemctl", description: "Control systemd services", category: "system", usage: "systemctl <action> <unit>" },
        CommandSpec { name: "service", description: "Run a SysV init script", category: "system", usage: "service <name> <action>" },
        CommandSpec { name: "df", description: "Report filesystem usage", category: "system", usage: "df [options]" },
        CommandSpec { name: "du", description: "Report directory disk usage", category: "system", usage: "du [options] [path]" },
        CommandSpec { name: "free", description: "Report memory usage", category: "system", usage: "free [options]" },
        CommandSpec { name: "uptime", description: "Show system uptime and load", category: "system", usage: "uptime" },
        CommandSpec { name: "whoami", description: "Print the effective user", category: "system", usage: "whoami" },
        CommandSpec { name: "id", description: "Print user and group ids", category: "system", usage: "id [user]" },
        CommandSpec { name: "uname", description: "Print system information", category: "system", usage: "uname [options]" },
        CommandSpec { name: "date", description: "Print or set the date", category: "system", usage: "date [options]" },
        CommandSpec { name: "wget", description: "Download files over HTTP", category: "network", usage: "wget <url>" },
        CommandSpec { name: "curl", description: "Transfer data from a URL", category: "network", usage: "curl [options] <url>" },
        CommandSpec { name: "ssh", description: "Open a remote shell", category: "network", usage: "ssh [user@]host" },
        CommandSpec { name: "scp", description: "Copy files over ssh", category: "network", usage: "scp <src> <dst>" },
        CommandSpec { name: "rsync", description: "Synchronize files and directories", category: "network", usage: "rsync [options] <src> <dst>" },
        CommandSpec { name: "tar", description: "Create or extract tar archives", category: "archive", usage: "tar [options] <archive> [files]" },
        CommandSpec { name: "zip", description: "Create zip archives", category: "archive", usage: "zip <archive> <files>" },
        CommandSpec { name: "unzip", description: "Extract zip archives", category: "archive", usage: "unzip <archive>" },
        CommandSpec { name: "gzip", description: "Compress files with gzip", category: "archive", usage: "gzip <file>" },
        CommandSpec { name: "gunzip", description: "Decompress gzip files", category: "archive", usage: "gunzip <file>" },
        CommandSpec { name: "history", description: "Show the shell history", category: "shell", usage: "history" },
        CommandSpec { name: "alias", description: "Define a command alias", category: "shell", usage: "alias [name=value]" },
        CommandSpec { name: "export", description: "Set an environment variable", category: "shell", usage: "export NAME=value" },
        CommandSpec { name: "echo", description: "Print arguments", category: "shell", usage: "echo [text]" },
        CommandSpec { name: "printf", description: "Format and print arguments", category: "shell", usage: "printf <format> [args]" },
    ]
});

/// A command the user has executed against a profile's session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub profile_id: String,
    pub command: String,
    pub executed_at: chrono::DateTime<chrono::Utc>,
    pub success: bool,
    /// Short excerpt of the command output, when the caller captured one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Bounded index of executed commands plus catalog-driven completion.
///
/// The store is append-only and capped; it is scoped per index instance,
/// not per profile, but every query can filter by profile id. Suggestions
/// come from the static catalog, not from recorded history.
pub struct CommandHistoryIndex {
    entries: Mutex<VecDeque<HistoryEntry>>,
    event_bus: Arc<EventBus>,
}

impl CommandHistoryIndex {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(HISTORY_CAP)),
            event_bus,
        }
    }

    /// Append an executed command, evicting the oldest entry at capacity.
    /// Blank input is ignored.
    pub fn record(
        &self,
        profile_id: &str,
        command: &str,
        success: bool,
        output: Option<String>,
    ) {
        let command = command.trim();
        if command.is_empty() {
            return;
        }

        {
            let mut entries = self.lock_entries();
            if entries.len() == HISTORY_CAP {
                entries.pop_front();
            }
            entries.push_back(HistoryEntry {
                id: uuid::Uuid::new_v4().to_string(),
                profile_id: profile_id.to_string(),
                command: command.to_string(),
                executed_at: chrono::Utc::now(),
                success,
                output,
            });
        }

        self.event_bus.publish(Event::HistoryUpdated {
            profile_id: Some(profile_id.to_string()),
        });
    }

    /// Recorded entries, most recent first, optionally filtered by profile.
    pub fn history(&self, profile_id: Option<&str>) -> Vec<HistoryEntry> {
        self.lock_entries()
            .iter()
            .rev()
            .filter(|e| profile_id.map_or(true, |id| e.profile_id == id))
            .cloned()
            .collect()
    }

    /// Case-insensitive substring search over recorded command text, most
    /// recent first.
    pub fn search(&self, query: &str, profile_id: Option<&str>) -> Vec<HistoryEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.lock_entries()
            .iter()
            .rev()
            .filter(|e| profile_id.map_or(true, |id| e.profile_id == id))
            .filter(|e| e.command.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Ranked completion candidates for a partial command, from the catalog.
    ///
    /// Tiers: exact name match, then name prefix, then substring in the name
    /// or description, catalog order within each tier. Empty input returns
    /// the head of the catalog.
    pub fn suggest(&self, prefix: &str) -> Vec<&'static CommandSpec> {
        let needle = prefix.trim().to_lowercase();
        if needle.is_empty() {
            return COMMAND_CATALOG.iter().take(SUGGEST_LIMIT).collect();
        }

        let mut out: Vec<&'static CommandSpec> = Vec::new();
        let push = |spec: &'static CommandSpec, out: &mut Vec<&'static CommandSpec>| {
            if out.len() < SUGGEST_LIMIT && !out.iter().any(|s| s.name == spec.name) {
                out.push(spec);
            }
        };

        for spec in COMMAND_CATALOG.iter() {
            if spec.name == needle {
                push(spec, &mut out);
            }
        }
        for spec in COMMAND_CATALOG.iter() {
            if spec.name.starts_with(&needle) {
                push(spec, &mut out);
            }
        }
        for spec in COMMAND_CATALOG.iter() {
            if spec.name.contains(&needle) || spec.description.to_lowercase().contains(&needle) {
                push(spec, &mut out);
            }
        }

        out
    }

    /// Catalog entry for an exact command name.
    pub fn command_help(&self, name: &str) -> Option<&'static CommandSpec> {
        let name = name.trim();
        COMMAND_CATALOG.iter().find(|c| c.name == name)
    }

    /// Drop history entries. With a profile id only that profile's entries
    /// go; without one the whole index is emptied.
    pub fn clear(&self, profile_id: Option<&str>) {
        {
            let mut entries = self.lock_entries();
            match profile_id {
                Some(id) => entries.retain(|e| e.profile_id != id),
                None => entries.clear(),
            }
        }
        self.event_bus.publish(Event::HistoryUpdated {
            profile_id: profile_id.map(str::to_string),
        });
    }

    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_entries().is_empty()
    }

    fn lock_entries(&self) -> MutexGuard<'_, VecDeque<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::tests::TestEventListener;
    use crate::domain::EventKind;

    fn index() -> (CommandHistoryIndex, Arc<TestEventListener>) {
        let bus = Arc::new(EventBus::new());
        let listener = Arc::new(TestEventListener::new());
        bus.subscribe(EventKind::HistoryUpdated, listener.clone());
        (CommandHistoryIndex::new(bus), listener)
    }

    #[test]
    fn record_evicts_oldest_at_capacity() {
        let (index, _) = index();
        for i in 0..1050 {
            index.record("p1", &format!("echo {}", i), true, None);
        }

        assert_eq!(index.len(), 1000);
        let history = index.history(None);
        assert_eq!(history[0].command, "echo 1049");
        assert_eq!(history[999].command, "echo 50");
    }

    #[test]
    fn record_publishes_and_skips_blank_input() {
        let (index, listener) = index();
        index.record("p1", "uptime", true, Some("up 3 days".to_string()));
        index.record("p1", "   ", true, None);

        assert_eq!(index.len(), 1);
        assert_eq!(listener.events().len(), 1);
    }

    #[test]
    fn history_is_newest_first_and_filterable() {
        let (index, _) = index();
        index.record("p1", "first", true, None);
        index.record("p2", "second", false, None);
        index.record("p1", "third", true, None);

        let all: Vec<String> = index.history(None).into_iter().map(|e| e.command).collect();
        assert_eq!(all, ["third", "second", "first"]);

        let p1: Vec<String> = index
            .history(Some("p1"))
            .into_iter()
            .map(|e| e.command)
            .collect();
        assert_eq!(p1, ["third", "first"]);
    }

    #[test]
    fn suggest_ranks_exact_then_prefix_then_substring() {
        let (index, _) = index();

        let names: Vec<&str> = index.suggest("grep").iter().map(|s| s.name).collect();
        assert_eq!(names[0], "grep");

        // "un" prefixes uname and unzip, and appears inside gunzip
        let names: Vec<&str> = index.suggest("un").iter().map(|s| s.name).collect();
        assert_eq!(&names[..2], ["uname", "unzip"]);
        assert!(names.contains(&"gunzip"));

        // description matches land in the last tier
        let names: Vec<&str> = index.suggest("archive").iter().map(|s| s.name).collect();
        assert!(names.contains(&"tar"));
        assert!(index.suggest("g").len() <= 10);
    }

    #[test]
    fn suggest_on_empty_input_returns_catalog_head() {
        let (index, _) = index();
        let suggestions = index.suggest("  ");
        assert_eq!(suggestions.len(), 10);
        assert_eq!(suggestions[0].name, "ls");
        assert_eq!(suggestions[1].name, "cd");
    }

    #[test]
    fn search_matches_substrings_case_insensitively() {
        let (index, _) = index();
        index.record("p1", "systemctl restart Nginx", true, None);
        index.record("p2", "df -h", true, None);

        let hits = index.search("nginx", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].command, "systemctl restart Nginx");
        assert!(index.search("nginx", Some("p2")).is_empty());
        assert!(index.search("", None).is_empty());
    }

    #[test]
    fn command_help_finds_catalog_entries() {
        let (index, _) = index();
        let help = index.command_help("tar").unwrap();
        assert_eq!(help.category, "archive");
        assert_eq!(index.command_help("printf").unwrap().category, "shell");
        assert_eq!(COMMAND_CATALOG.last().unwrap().name, "printf");
        assert!(index.command_help("definitely-not-a-command").is_none());
    }

    #[test]
    fn clear_scopes_to_a_profile_when_given() {
        let (index, listener) = index();
        index.record("p1", "ls", true, None);
        index.record("p2", "pwd", true, None);
        index.record("p1", "whoami", true, None);

        index.clear(Some("p1"));
        assert_eq!(index.len(), 1);

        index.clear(None);
        assert!(index.is_empty());
        // three records and two clears
        assert_eq!(listener.events().len(), 5);
    }
}
