use api_client::HttpProgressClient;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{Config, init_logging, load_config};
use core_types::{GateResult, LessonId, RouteTarget};
use database::{connect, run_migrations};
use engine::view::LearningPath;
use engine::{ProgressService, ServiceOptions};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// The entry point for the academy learning platform.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file, if present.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = load_config()?;
    let _log_guard = init_logging(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Serve => web_server::run_server(&config).await,
        Commands::Migrate => {
            let db_pool = connect().await?;
            run_migrations(&db_pool).await?;
            tracing::info!("Database migrations applied.");
            Ok(())
        }
        Commands::Route(args) => {
            let service = remote_service(&config)?;
            let outcome = service.evaluate_route(args.uid, args.target()).await?;
            print_json(&outcome)
        }
        Commands::Complete(args) => {
            let service = remote_service(&config)?;
            let outcome = service
                .on_gate_completed(args.uid, GateResult::passed(LessonId(args.lesson_id)))
                .await?;
            if !outcome.synced {
                tracing::warn!(learner = %args.uid, "Completion was not acknowledged by the progress store.");
            }
            print_json(&outcome)
        }
        Commands::Next(args) => {
            let service = remote_service(&config)?;
            let outcome = service.advance(args.uid, args.target()).await?;
            print_json(&outcome)
        }
        Commands::Path(args) => {
            let service = remote_service(&config)?;
            let path = service.learning_path(args.uid).await?;
            println!("{}", render_path(&path));
            Ok(())
        }
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Lesson progression for the trading academy.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the progress store API and the learning routes.
    Serve,
    /// Apply the database migrations.
    Migrate,
    /// Ask whether a lesson route renders or redirects.
    Route(RouteArgs),
    /// Report a passed quiz for a lesson.
    Complete(CompleteArgs),
    /// Press "next" on a lesson.
    Next(RouteArgs),
    /// Show the learner's path through the curriculum.
    Path(LearnerArgs),
}

#[derive(Parser)]
struct RouteArgs {
    /// The learner's id.
    uid: Uuid,
    level: u32,
    /// Page number within the level, starting at 1.
    lesson: u32,
}

impl RouteArgs {
    fn target(&self) -> RouteTarget {
        RouteTarget::new(self.level, self.lesson)
    }
}

#[derive(Parser)]
struct CompleteArgs {
    uid: Uuid,
    lesson_id: i64,
}

#[derive(Parser)]
struct LearnerArgs {
    uid: Uuid,
}

// ==============================================================================
// Helpers
// ==============================================================================

/// A progress service that talks to a running store over HTTP.
fn remote_service(config: &Config) -> anyhow::Result<ProgressService> {
    let client = Arc::new(HttpProgressClient::new(&config.progress_store)?);
    Ok(ProgressService::new(
        client.clone(),
        client,
        ServiceOptions::from_config(config),
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn mark(flag: bool) -> &'static str {
    if flag { "yes" } else { "" }
}

fn render_path(path: &LearningPath) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Level", "Page", "Lesson", "Unlocked", "Visited", "Completed", ""]);

    for level in &path.levels {
        for lesson in &level.lessons {
            table.add_row(vec![
                level.level.to_string(),
                lesson.page_number.to_string(),
                lesson.title.clone(),
                mark(lesson.unlocked).to_string(),
                mark(lesson.visited).to_string(),
                mark(lesson.completed).to_string(),
                if lesson.current { "<- you are here".to_string() } else { String::new() },
            ]);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::view::{PathLesson, PathLevel};

    #[test]
    fn path_table_marks_the_current_lesson() {
        let path = LearningPath {
            pointer: RouteTarget::new(0, 2),
            levels: vec![PathLevel {
                level: 0,
                title: None,
                completed: false,
                expanded: true,
                lessons: vec![
                    PathLesson {
                        id: LessonId(1),
                        page_number: 1,
                        title: "Welcome".to_string(),
                        unlocked: true,
                        visited: true,
                        completed: false,
                        current: false,
                    },
                    PathLesson {
                        id: LessonId(2),
                        page_number: 2,
                        title: "Candles".to_string(),
                        unlocked: true,
                        visited: true,
                        completed: false,
                        current: true,
                    },
                ],
            }],
        };
        let rendered = render_path(&path).to_string();
        assert!(rendered.contains("Candles"));
        assert_eq!(rendered.matches("you are here").count(), 1);
    }

    #[test]
    fn cli_parses_positional_routes() {
        let cli = Cli::try_parse_from(["academy", "route", "6f1c1c3e-8a43-4c8e-9d0e-0b6d2b0c9a11", "0", "3"]).unwrap();
        match cli.command {
            Commands::Route(args) => assert_eq!(args.target(), RouteTarget::new(0, 3)),
            _ => panic!("expected the route command"),
        }
    }
}
