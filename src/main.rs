use serde::Serialize;
use student_dashboard_lib::{commands, config, AppState, Config};

const USAGE: &str = "usage: student-dashboard <command>

commands:
  dashboard              load the dashboard (cached when fresh)
  refresh                drop the cache and reload everything
  course <id>            show one course
  rename <id> <name>     set a custom course name
  unrename <id>          remove a custom course name
  names                  list custom course names
  clear-cache            drop every cached entry
  watch                  reload on the auto-refresh interval until interrupted";

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let out = serde_json::to_string_pretty(value).map_err(|e| format!("Failed to encode output: {e}"))?;
    println!("{out}");
    Ok(())
}

fn parse_course_id(raw: Option<&String>) -> Result<i64, String> {
    let raw = raw.ok_or_else(|| USAGE.to_string())?;
    raw.parse::<i64>()
        .map_err(|_| format!("course id must be a number, got '{raw}'"))
}

async fn run(state: AppState, args: &[String]) -> Result<(), String> {
    let session = state.session();
    match args.first().map(String::as_str) {
        Some("dashboard") | None => print_json(&commands::load_dashboard(&state, &session, false).await?),
        Some("refresh") => print_json(&commands::refresh_dashboard(&state, &session).await?),
        Some("course") => {
            let course_id = parse_course_id(args.get(1))?;
            print_json(&commands::get_course_detail(&state, &session, course_id).await?)
        }
        Some("rename") => {
            let course_id = parse_course_id(args.get(1))?;
            let name = args[2..].join(" ");
            print_json(&commands::save_course_name(&state, &session, course_id, &name).await?)
        }
        Some("unrename") => {
            let course_id = parse_course_id(args.get(1))?;
            let removed = commands::delete_course_name(&state, &session, course_id).await?;
            print_json(&serde_json::json!({ "courseId": course_id, "removed": removed }))
        }
        Some("names") => print_json(&commands::list_course_names(&state, &session).await?),
        Some("clear-cache") => commands::clear_cache(&state).await,
        Some("watch") => {
            let interval = state.config.auto_refresh_interval;
            let state = std::sync::Arc::new(state);
            print_json(&commands::load_dashboard(&state, &session, false).await?)?;
            let handle = commands::spawn_auto_refresh(state, session, interval);
            tokio::signal::ctrl_c()
                .await
                .map_err(|e| format!("Failed to wait for interrupt: {e}"))?;
            handle.abort();
            Ok(())
        }
        Some(_) => Err(USAGE.to_string()),
    }
}

#[tokio::main]
async fn main() {
    config::load_dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return;
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e}");
            std::process::exit(2);
        }
    };

    let result = match student_dashboard_lib::init(config).await {
        Ok(state) => run(state, &args).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
