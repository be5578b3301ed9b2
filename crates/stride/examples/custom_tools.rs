//! Custom tools example: domain tools with `FnTool`, typed arguments and a
//! composite event handler.
//!
//! Demonstrates:
//! - Typed argument structs with `Deserialize` + `JsonSchema`
//! - Conditional registration with `with_if`
//! - A non-recoverable tool error that stops the task
//! - Event handling with `CompositeEventHandler`
//!
//! # Usage
//!
//! ```bash
//! STRIDE_API_KEY=sk-... cargo run --example custom_tools
//! ```

use stride::prelude::*;
use stride::schemars;
use schemars::JsonSchema;
use serde::Deserialize;

// ── Typed argument structs ──────────────────────────────────────────

/// Arguments for the `lookup_word` tool.
#[derive(Deserialize, JsonSchema)]
struct LookupWordArgs {
    /// The word to look up.
    word: String,
}

/// Arguments for the `save_note` tool.
#[derive(Deserialize, JsonSchema)]
struct SaveNoteArgs {
    /// Title for the note.
    title: String,
    /// Note content (markdown).
    content: String,
}

// ── Tool constructors ───────────────────────────────────────────────

fn lookup_word_tool() -> FnTool {
    let def = ToolDef::new(
        "lookup_word",
        "Look up the definition of a word.",
        json_schema_for::<LookupWordArgs>(),
    );
    FnTool::new(def, |args: LookupWordArgs| async move {
        // A real tool would call a dictionary API here.
        Ok(format!("{}: [stub] definition goes here.", args.word))
    })
}

fn save_note_tool() -> FnTool {
    let def = ToolDef::new(
        "save_note",
        "Save a markdown note to the notebook.",
        json_schema_for::<SaveNoteArgs>(),
    );
    FnTool::new(def, |args: SaveNoteArgs| async move {
        if args.title.contains('/') {
            // The notebook store is keyed by title; this cannot be retried.
            return Err(ToolError::NonRecoverable(format!(
                "note title '{}' is not a valid key",
                args.title
            )));
        }
        Ok(format!("Saved note '{}' ({} bytes)", args.title, args.content.len()))
    })
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), String> {
    let api_key = std::env::var("STRIDE_API_KEY")
        .map_err(|_| "Set STRIDE_API_KEY to your OpenRouter API key")?;
    let backend = HttpBackend::new(Provider::OpenRouter, api_key).map_err(|e| e.to_string())?;
    let client = LlmClient::new(backend, DEFAULT_MODEL);

    // Simulate a feature flag.
    let notes_enabled = true;

    let tools = ToolRegistry::new()
        .with(ThinkTool)
        .with(lookup_word_tool())
        .with_if(notes_enabled, save_note_tool());

    let handler = CompositeEventHandler::new()
        .with(LoggingHandler)
        .with(FnEventHandler::new(|event| {
            if let AgentEvent::ToolResult { result } = event {
                eprintln!("[callback] {} -> {} bytes", result.tool_name, result.output.len());
            }
        }));

    let execution = Harness::new(&client, &tools, AgentConfig::new().with_max_steps(10))
        .with_event_handler(&handler)
        .new_task(
            "Look up the word 'ephemeral' and save a note about it.",
            ExtraArgs::new(),
        )
        .execute()
        .await;

    println!("\n{}", execution.final_result.as_deref().unwrap_or(""));
    println!(
        "\n--- {} | {} step(s) | {} tool call(s) ---",
        execution.terminal_state,
        execution.trajectory.len(),
        execution.trajectory.tool_call_count()
    );
    Ok(())
}
