use std::io::Write;

use relaygraph::{
    Executor, Graph, Message, Role, RunOutcome, SessionId, State, cancellation,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::error::{CliError, CliResult};

/// Lines that end an interactive session.
pub const SENTINELS: [&str; 4] = ["exit", "quit", "종료", "그만"];

pub fn is_sentinel(line: &str) -> bool {
    let line = line.trim().to_lowercase();
    SENTINELS.contains(&line.as_str())
}

/// Run `graph` for one user message. Ctrl-C cancels the step in flight.
pub async fn run_turn(
    executor: &Executor,
    graph: &Graph,
    session: &SessionId,
    text: &str,
) -> RunOutcome {
    let (handle, signal) = cancellation();
    let run = executor.run_with_cancel(
        graph,
        State::from_message(Message::user(text)),
        Some(session),
        signal,
    );
    tokio::pin!(run);

    let mut listening = true;
    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            result = tokio::signal::ctrl_c(), if listening => {
                listening = false;
                match result {
                    Ok(()) => {
                        eprintln!("\n(interrupted, cancelling the running step)");
                        handle.cancel();
                    }
                    Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
                }
            }
        }
    }
}

/// Entries written after the latest user message.
pub fn replies(state: &State) -> &[Message] {
    let history = state.history();
    let start = history
        .iter()
        .rposition(Message::is_user)
        .map_or(0, |i| i + 1);
    &history[start..]
}

pub fn print_outcome(outcome: &RunOutcome) {
    println!("\n{}", "=".repeat(25));
    for message in replies(&outcome.state) {
        match message.role {
            Role::Tool => println!("[tool] {}", message.content),
            _ => println!("{}", message.content),
        }
    }
    println!("{}", "=".repeat(25));
    if let Some(error) = outcome.error() {
        eprintln!("(run aborted: {})", error.error_code());
    }
}

/// One turn, for `--once`. An aborted run is an error exit.
pub async fn once(
    executor: &Executor,
    graph: &Graph,
    session: &SessionId,
    text: &str,
) -> CliResult<()> {
    let outcome = run_turn(executor, graph, session, text).await;
    print_outcome(&outcome);
    match outcome.error() {
        Some(error) => Err(CliError::RunAborted(error.error_code())),
        None => Ok(()),
    }
}

/// Read lines from stdin until a sentinel, EOF or Ctrl-C at the prompt.
/// Aborted runs are reported and the loop goes on.
pub async fn interactive(
    executor: &Executor,
    graph: &Graph,
    session: &SessionId,
    title: &str,
) -> CliResult<()> {
    println!("==================================================");
    println!("  {title}");
    println!("==================================================");
    println!("세션: {} (종료: {})", session.short(), SENTINELS.join(", "));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n사용자: ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if is_sentinel(text) {
            break;
        }

        let outcome = run_turn(executor, graph, session, text).await;
        print_outcome(&outcome);
    }
    println!("\nAI 에이전트: 프로그램을 종료합니다.");
    Ok(())
}
