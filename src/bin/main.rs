use hisab_assistant::{
    api::stable_uuid_from_string, AppConfig, Assistant, AssistantError, AssistantTurn,
    ConfirmationDecision, GeminiClient, InMemoryRecordStore, PlanKind, SystemClock, TurnKind,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const LOCAL_USER: &str = "local-user";

const HELP: &str = "Commands: yes / no (answer a pending confirmation), /undo, /analysis, \
/budget, /saving, /save (store a generated plan), /quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let config = AppConfig::from_env()?;
    let model = Arc::new(GeminiClient::new(&config)?);
    let assistant = Assistant::new(
        Arc::new(InMemoryRecordStore::new()),
        model,
        Arc::new(SystemClock),
        config,
    );

    let user_id = stable_uuid_from_string(LOCAL_USER);
    info!(user_id = %user_id, "Hisab chat starting");

    let mut pending: Option<Uuid> = None;
    print_turn(&assistant.start_chat(user_id).await?);
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_prompt();
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = match (line, pending) {
            ("/quit" | "/exit", _) => break,
            ("/help", _) => {
                println!("{}", HELP);
                continue;
            }
            ("yes" | "y" | "no" | "n", Some(confirmation_id)) => {
                let decision = ConfirmationDecision {
                    confirmation_id,
                    confirmed: matches!(line, "yes" | "y"),
                    selections: HashMap::new(),
                };
                assistant.confirm(user_id, decision).await
            }
            // starting a plan drops the staged batch
            ("/budget", _) => assistant.start_plan(user_id, PlanKind::Budget).await,
            ("/saving", _) => assistant.start_plan(user_id, PlanKind::Saving).await,
            (_, Some(_)) => {
                println!("Please answer yes or no to the pending confirmation first.");
                continue;
            }
            ("/undo", None) => assistant.undo(user_id).await,
            ("/analysis", None) => assistant.generate_analysis(user_id).await,
            ("/save", None) => assistant.save_plan(user_id).await,
            (message, None) => assistant.handle_message(user_id, message).await,
        };

        track_pending(&mut pending, &result);
        match result {
            Ok(turn) => print_turn(&turn),
            Err(e) => println!("Error: {}", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}

fn print_prompt() {
    use std::io::Write;
    print!("> ");
    std::io::stdout().flush().ok();
}

/// Mirror the session's staged batch: every turn says whether one is waiting
fn track_pending(pending: &mut Option<Uuid>, result: &Result<AssistantTurn, AssistantError>) {
    match result {
        Ok(turn) => *pending = turn.confirmation.as_ref().map(|c| c.id),
        Err(AssistantError::NoPendingConfirmation | AssistantError::StaleConfirmation(_)) => {
            *pending = None
        }
        Err(_) => {}
    }
}

fn print_turn(turn: &AssistantTurn) {
    println!("\n{}", turn.message);

    if let Some(confirmation) = &turn.confirmation {
        for op in &confirmation.operations {
            println!("  {}. {}", op.index + 1, op.preview);
        }
        println!("Confirm? (yes/no)");
    }

    if let Some(outcomes) = &turn.outcomes {
        for outcome in outcomes {
            let mark = if outcome.success { "ok" } else { "failed" };
            println!("  [{}] {}", mark, outcome.message);
        }
    }

    if turn.kind == TurnKind::PlanReady {
        println!("Type /save to keep this plan.");
    }

    for suggestion in &turn.suggestions {
        println!("  try: {}", suggestion);
    }

    if turn.undo_available > 0 {
        println!("({} action(s) can be undone with /undo)", turn.undo_available);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hisab_assistant::assistant::ConfirmationPrompt;

    fn staged_turn(id: Uuid) -> AssistantTurn {
        let mut turn = AssistantTurn::new(TurnKind::ConfirmationRequired, "Please confirm", 0);
        turn.confirmation = Some(ConfirmationPrompt {
            id,
            message: "Please confirm".to_string(),
            operations: Vec::new(),
        });
        turn
    }

    #[test]
    fn test_any_turn_without_confirmation_clears_pending() {
        let id = Uuid::new_v4();
        let mut pending = None;

        track_pending(&mut pending, &Ok(staged_turn(id)));
        assert_eq!(pending, Some(id));

        let question = AssistantTurn::new(TurnKind::PlanQuestion, "Question 1 of 5", 0);
        track_pending(&mut pending, &Ok(question));
        assert_eq!(pending, None);
    }

    #[test]
    fn test_confirmation_errors_clear_pending() {
        let mut pending = Some(Uuid::new_v4());
        track_pending(&mut pending, &Err(AssistantError::LlmError("timeout".to_string())));
        assert!(pending.is_some());

        track_pending(&mut pending, &Err(AssistantError::NoPendingConfirmation));
        assert_eq!(pending, None);

        let mut pending = Some(Uuid::new_v4());
        track_pending(&mut pending, &Err(AssistantError::StaleConfirmation("x".to_string())));
        assert_eq!(pending, None);
    }
}
