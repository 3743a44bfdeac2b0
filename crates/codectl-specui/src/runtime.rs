//! Runs `Command`s off the UI thread. Every job is a one-shot blocking task
//! that sends exactly one `Msg` back; jobs that need to continue are
//! re-issued by `App::update`.

use crate::app::{Command, Msg};
use crate::diff;
use crate::render;
use crate::terminal::{self, ReadOutcome, TerminalSession};
use crate::watch;
use codectl_core::spec_docs;
use codectl_core::tasks::load_tasks;
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

pub type MsgSender = UnboundedSender<Msg>;

pub fn execute(root: &Path, cmd: Command, tx: &MsgSender) {
    let root = root.to_path_buf();
    let tx = tx.clone();
    let name = cmd.name();
    tokio::task::spawn_blocking(move || {
        if tx.send(run_command(&root, cmd)).is_err() {
            debug!(command = name, "result_dropped_after_shutdown");
        }
    });
}

/// Runs one command on the current thread and returns its result message.
pub fn run_command(root: &Path, cmd: Command) -> Msg {
    match cmd {
        Command::Render {
            path,
            width,
            force_fast,
        } => {
            let result = render::render_document(&path, width, force_fast).map_err(|err| {
                warn!(path = %path.display(), error = %err, "render_failed");
                err.to_string()
            });
            Msg::Rendered {
                path,
                width,
                fast: force_fast,
                result,
            }
        }
        Command::ListChanges { spec_only } => {
            let result = diff::list_changes(root, spec_only).map_err(|err| {
                warn!(error = %err, "list_changes_failed");
                err.to_string()
            });
            Msg::ChangesListed { spec_only, result }
        }
        Command::RenderDiff {
            path,
            mode,
            width,
            use_secondary,
        } => {
            let result = diff::render_diff(root, &path, mode, width, use_secondary)
                .map_err(|err| err.to_string());
            Msg::DiffRendered {
                path,
                mode,
                width,
                result,
            }
        }
        Command::LoadTasks => {
            let tasks = load_tasks(root).map_err(|err| {
                warn!(error = %err, "load_tasks_failed");
                err.to_string()
            });
            let specs = spec_docs::list_spec_docs(root).unwrap_or_else(|err| {
                warn!(error = %err, "list_spec_docs_failed");
                Vec::new()
            });
            Msg::TasksLoaded { tasks, specs }
        }
        Command::ComputeFingerprint { dirs } => Msg::Fingerprint(watch::fingerprint(&dirs)),
        Command::AwaitWatch(changes) => {
            if watch::wait_for_change(&changes, watch::DEBOUNCE) {
                Msg::TreeChanged
            } else {
                Msg::WatchClosed
            }
        }
        Command::StartPty {
            generation,
            cols,
            rows,
        } => {
            let result = TerminalSession::spawn(root, cols, rows).map_err(|err| err.to_string());
            Msg::PtyStarted { generation, result }
        }
        Command::ReadPty { generation, reader } => match terminal::read_chunk(reader) {
            ReadOutcome::Data(reader, data) => Msg::PtyChunk {
                generation,
                reader,
                data,
            },
            ReadOutcome::Closed => Msg::PtyClosed { generation },
        },
    }
}
