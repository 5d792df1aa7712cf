//! agent command-line front end
//!
//! Usage:
//!   agent ask "prompt" [--context text] [--tools]   Single completion
//!   agent chain "draft ..." "refine ..."           Each stage gets the previous output
//!   agent fanout "q1" "q2" ...                     Run prompts concurrently
//!   agent models [--provider name]                 Show the model catalog
//!
//! Provider settings come from `LLM_*` variables (a `.env` file is loaded
//! first); `--provider`, `--model` and `--temperature` override them.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{
    Agent, AgentError, LlmConfig, LlmProvider, Pipeline, ProviderKind,
    pipeline::provider_task,
    tool::{CalculatorTool, DateTimeTool, Tool},
};
use agent_runtime::new_llm_task;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Provider-agnostic LLM agent toolkit", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    provider: ProviderArgs,

    #[command(flatten)]
    persona: PersonaArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProviderArgs {
    /// Backend: openai, openai-azure, anthropic, gemini or ollama
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Model id (must be in the provider's catalog except for ollama)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long, global = true)]
    temperature: Option<f32>,
}

#[derive(Args)]
struct PersonaArgs {
    #[arg(long, global = true, default_value = "helpful research assistant")]
    role: String,

    #[arg(long, global = true, default_value = "you answer precisely and cite your reasoning")]
    backstory: String,

    #[arg(long, global = true, default_value = "give the user a correct, concise answer")]
    goal: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single completion
    Ask {
        prompt: String,

        /// Extra context appended to the prompt
        #[arg(short, long)]
        context: Option<String>,

        /// Offer the built-in calculator and datetime tools
        #[arg(long)]
        tools: bool,
    },
    /// Run prompts as a chain, feeding each output into the next stage
    Chain {
        #[arg(required = true)]
        prompts: Vec<String>,
    },
    /// Run prompts concurrently and print every answer
    Fanout {
        #[arg(required = true)]
        prompts: Vec<String>,
    },
    /// List known models
    Models,
}

impl Cli {
    fn agent(&self) -> Agent {
        Agent::new()
            .with_role(&self.persona.role)
            .with_backstory(&self.persona.backstory)
            .with_goal(&self.persona.goal)
    }

    /// Environment configuration with command-line overrides applied
    fn config(&self) -> Result<LlmConfig> {
        let overrides = &self.provider;
        let mut config = LlmConfig::from_lookup(|key| match key {
            "LLM_PROVIDER" if overrides.provider.is_some() => overrides.provider.clone(),
            "LLM_MODEL" if overrides.model.is_some() => overrides.model.clone(),
            _ => std::env::var(key).ok(),
        })
        .context("loading LLM configuration")?;

        if let Some(temperature) = overrides.temperature {
            config = config.with_temperature(temperature);
        }
        Ok(config)
    }

    fn task(&self, prompt: &str) -> Result<Box<dyn LlmProvider>> {
        let mut task = new_llm_task(&self.agent(), &self.config()?)?;
        task.with_user_prompt(prompt.to_string());
        Ok(task)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            on_ctrl_c.cancel();
        }
    });

    match run(&cli, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("{}", failure_message(&err));
            ExitCode::FAILURE
        }
    }
}

/// One line for stderr: the friendly text for agent errors, the full
/// context chain for anything else.
fn failure_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<AgentError>() {
        Some(agent_err) => format!("error: {}", agent_err.user_message()),
        None => format!("error: {err:#}"),
    }
}

async fn run(cli: &Cli, cancel: &CancellationToken) -> Result<()> {
    match &cli.command {
        Commands::Ask {
            prompt,
            context,
            tools,
        } => {
            let mut task = cli.task(prompt)?;
            if *tools {
                let builtins: Vec<Arc<dyn Tool>> = vec![Arc::new(CalculatorTool), Arc::new(DateTimeTool)];
                task.with_tools(builtins);
                tracing::info!(tools = task.declared_tools().len(), "registered built-in tools");
            }

            let context: Vec<&str> = context.iter().map(String::as_str).collect();
            let answer = task.completion(cancel, &context).await?;
            println!("{answer}");
        }
        Commands::Chain { prompts } => {
            let stages = prompts
                .iter()
                .map(|prompt| cli.task(prompt).map(|task| provider_task(Arc::from(task))))
                .collect::<Result<Vec<_>>>()?;

            tracing::info!(stages = stages.len(), "running chain");
            let chain = Pipeline::create_chain(stages);
            let answer = chain(cancel.clone(), None).await?;
            println!("{answer}");
        }
        Commands::Fanout { prompts } => {
            let mut pipeline = Pipeline::new();
            for prompt in prompts {
                pipeline.add_task(provider_task(Arc::from(cli.task(prompt)?)));
            }

            tracing::info!(tasks = pipeline.len(), "running concurrently");
            let outcome = pipeline.run_concurrently(cancel).await;
            let answers: Vec<Option<String>> = match &outcome {
                Ok(answers) => answers.iter().cloned().map(Some).collect(),
                Err(err) => err.partial_results().map(<[_]>::to_vec).unwrap_or_default(),
            };
            for (prompt, answer) in prompts.iter().zip(answers) {
                if let Some(answer) = answer {
                    println!("## {prompt}\n{answer}\n");
                }
            }
            outcome?;
        }
        Commands::Models => {
            let kinds: Vec<ProviderKind> = match &cli.provider.provider {
                Some(name) => vec![name.parse()?],
                None => ProviderKind::ALL.to_vec(),
            };
            for kind in kinds {
                println!("{kind}:");
                for model in kind.models() {
                    println!("  {model}");
                }
            }
        }
    }
    Ok(())
}
