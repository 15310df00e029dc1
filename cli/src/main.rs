use std::io::{self, Write};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::{Config, DeviceForm, IpcRequest, IpcResponse, Notification, PolicyForm, PolicyType};
use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use tokio::time::{sleep, Duration};

mod client;
mod render;

use client::Client;

const COMMANDS: &[&str] = &[
    "login", "signup", "logout", "whoami", "open", "users", "devices", "register", "policies", "policy",
    "activity", "alerts", "resolve", "notifications", "deadletters", "dashboard", "live", "status", "help",
    "clear", "exit",
];

const DEVICE_TYPES: &[&str] = &["mobile", "desktop", "tablet"];
const POLICY_TYPES: &[&str] = &["access", "device", "network", "time"];

#[derive(Parser, Debug)]
#[command(name = "ztd-cli")]
#[command(about = "Terminal client for the zero-trust dashboard agent", long_about = None)]
struct Cli {
    /// Agent socket (defaults to ipc.socket_path from the config)
    #[arg(short, long, global = true)]
    socket: Option<String>,

    /// Config file (defaults to $ZTD_CONFIG or ./config/default.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

/// A slash command typed at the interactive prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, disable_help_flag = true)]
struct Line {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Show agent status
    Status,
    /// Live dashboard (refreshes every second)
    Live,
    /// Resolve a path through the route guards
    Open { path: String },
    /// Sign in with email and password
    Login { email: Option<String> },
    /// Create an account
    Signup { email: Option<String> },
    /// Sign out
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List user profiles
    Users,
    /// List registered devices
    Devices,
    /// Register a device for the signed-in user
    Register {
        name: Option<String>,
        #[arg(long = "type")]
        device_type: Option<String>,
        #[arg(long)]
        os: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    /// List access policies
    Policies,
    /// Create an access policy
    Policy {
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        applies_to: Option<String>,
        #[arg(long = "type")]
        policy_type: Option<String>,
    },
    /// Recent access activity
    Activity {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
    /// Security alerts
    Alerts,
    /// Resolve a security alert
    Resolve { id: String },
    /// Recent notifications
    Notifications {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
    /// Audit entries that never reached the backend
    #[command(alias = "deadletters")]
    DeadLetters {
        #[arg(default_value_t = 20)]
        limit: i64,
    },
    /// Security overview
    Dashboard,
}

/// What the interactive prompt should do with a line of input.
#[derive(Debug, PartialEq)]
enum Input {
    Run(Command),
    Help,
    Clear,
    Exit,
    Invalid(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let words: Vec<&str> = line.trim_start_matches('/').split_whitespace().collect();
    let input = match words.first().copied() {
        Some("help") | Some("?") => Input::Help,
        Some("clear") => Input::Clear,
        Some("exit") | Some("quit") | Some("q") | Some("bye") => Input::Exit,
        _ => match Line::try_parse_from(words.iter().copied()) {
            Ok(parsed) => Input::Run(parsed.command),
            Err(e) => Input::Invalid(e.render().to_string().lines().next().unwrap_or("invalid command").to_string()),
        },
    };
    Some(input)
}

fn socket_path(cli: &Cli) -> String {
    if let Some(socket) = &cli.socket {
        return socket.clone();
    }
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    match Config::load(&path) {
        Ok(config) => config.ipc.socket_path,
        Err(e) => {
            log::debug!("no usable config ({:#}), using default socket", e);
            Config::default().ipc.socket_path
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let mut shell = Shell::new(Client::new(socket_path(&cli)));

    match cli.command {
        Some(command) => shell.run(command).await,
        None => shell.interactive().await,
    }
}

/// Sends commands and prints any toast the agent raised while handling them.
struct Shell {
    client: Client,
    last_toast: u64,
}

impl Shell {
    fn new(client: Client) -> Self {
        Self { client, last_toast: 0 }
    }

    async fn interactive(&mut self) -> Result<()> {
        show_welcome(self.client.socket_path());
        self.catch_up_toasts().await;

        enable_raw_mode()?;
        let mut stdout = io::stdout();

        let mut input = String::new();
        let mut suggestions: Vec<String> = Vec::new();
        let mut selected_suggestion = 0;

        loop {
            execute!(stdout, Clear(ClearType::CurrentLine), Clear(ClearType::FromCursorDown))?;
            print!("\r{}{}", "ztd> ".bright_cyan().bold(), input);

            if let Some(query) = input.strip_prefix('/') {
                suggestions = COMMANDS
                    .iter()
                    .filter(|cmd| cmd.starts_with(query) && !query.contains(' '))
                    .map(|s| format!("/{}", s))
                    .collect();

                if !suggestions.is_empty() {
                    execute!(stdout, crossterm::cursor::SavePosition)?;
                    print!("\r\n{}", "  Suggestions:".dimmed());
                    for (i, sug) in suggestions.iter().enumerate() {
                        let style = if i == selected_suggestion { sug.bright_cyan().bold() } else { sug.dimmed() };
                        print!("\r\n  {}", style);
                    }
                    execute!(stdout, crossterm::cursor::RestorePosition)?;
                }
            } else {
                suggestions.clear();
            }
            stdout.flush()?;

            if !event::poll(std::time::Duration::from_millis(100))? {
                continue;
            }
            let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? else {
                continue;
            };
            match code {
                KeyCode::Enter => {
                    if let Some(suggestion) = suggestions.get(selected_suggestion) {
                        if !input.contains(' ') {
                            input = suggestion.clone();
                        }
                    }
                    execute!(stdout, Clear(ClearType::FromCursorDown))?;
                    print!("\r\n");

                    // Prompts and renderers expect a cooked terminal.
                    disable_raw_mode()?;
                    let keep_going = self.dispatch(&input).await;
                    enable_raw_mode()?;

                    input.clear();
                    suggestions.clear();
                    selected_suggestion = 0;
                    if !keep_going {
                        break;
                    }
                }
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => break,
                KeyCode::Char(c) => {
                    input.push(c);
                    selected_suggestion = 0;
                }
                KeyCode::Backspace => {
                    input.pop();
                    selected_suggestion = 0;
                }
                KeyCode::Up => {
                    selected_suggestion = selected_suggestion.saturating_sub(1);
                }
                KeyCode::Down => {
                    selected_suggestion = (selected_suggestion + 1).min(suggestions.len().saturating_sub(1));
                }
                KeyCode::Tab => {
                    if let Some(suggestion) = suggestions.get(selected_suggestion) {
                        input = format!("{} ", suggestion);
                        suggestions.clear();
                        selected_suggestion = 0;
                    }
                }
                KeyCode::Esc => {
                    suggestions.clear();
                    selected_suggestion = 0;
                }
                _ => {}
            }
        }

        execute!(stdout, Clear(ClearType::FromCursorDown))?;
        disable_raw_mode()?;
        println!("\n{}", "Goodbye!".bright_green());
        Ok(())
    }

    /// Returns false when the user asked to leave.
    async fn dispatch(&mut self, line: &str) -> bool {
        match parse_input(line) {
            None => {}
            Some(Input::Help) => show_welcome(self.client.socket_path()),
            Some(Input::Clear) => {
                let _ = execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0));
            }
            Some(Input::Exit) => return false,
            Some(Input::Invalid(message)) => {
                println!("{} {}", "✗".red().bold(), message);
                println!("{}", "Type /help for available commands".dimmed());
            }
            Some(Input::Run(command)) => {
                if let Err(e) = self.run(command).await {
                    println!("{} {:#}", "✗ Error:".red().bold(), e);
                }
            }
        }
        true
    }

    async fn run(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Status => render::print_status(&self.send(IpcRequest::Status).await?),
            Command::Live => self.live().await?,
            Command::Open { path } => render::print_navigate(&self.send(IpcRequest::Navigate { path }).await?),
            Command::Login { email } => {
                let email = ask_text("Email:", email)?;
                let password = Password::new("Password:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .without_confirmation()
                    .prompt()?;
                let response = self.send(IpcRequest::SignIn { email, password }).await?;
                match response.error_message() {
                    None => println!("{} Signed in", "✓".green().bold()),
                    Some(message) => println!("{} {}", "✗".red().bold(), message.red()),
                }
            }
            Command::Signup { email } => {
                let email = ask_text("Email:", email)?;
                let password = Password::new("Password:")
                    .with_display_mode(PasswordDisplayMode::Masked)
                    .with_custom_confirmation_message("Confirm password:")
                    .prompt()?;
                let response = self.send(IpcRequest::SignUp { email, password }).await?;
                if let Some(message) = response.error_message() {
                    println!("{} {}", "✗".red().bold(), message.red());
                }
            }
            Command::Logout => {
                let response = self.send(IpcRequest::SignOut).await?;
                if response.success {
                    println!("{} Signed out", "✓".green().bold());
                }
            }
            Command::Whoami => render::print_whoami(&self.send(IpcRequest::Whoami).await?),
            Command::Users => render::print_users(&self.send(IpcRequest::Users).await?),
            Command::Devices => render::print_devices(&self.send(IpcRequest::Devices).await?),
            Command::Register { name, device_type, os, location } => {
                let form = DeviceForm {
                    name: ask_text("Device name:", name)?,
                    device_type: match device_type {
                        Some(t) => t,
                        None => Select::new("Device type:", DEVICE_TYPES.to_vec()).prompt()?.to_string(),
                    },
                    os: ask_text("Operating system:", os)?,
                    location: match location {
                        Some(l) => Some(l),
                        None => Text::new("Location (optional):").prompt_skippable()?,
                    },
                };
                render::print_device(&self.send(IpcRequest::RegisterDevice(form)).await?);
            }
            Command::Policies => render::print_policies(&self.send(IpcRequest::Policies).await?),
            Command::Policy { name, description, applies_to, policy_type } => {
                let policy_type = match policy_type {
                    Some(t) => parse_policy_type(&t)?,
                    None => parse_policy_type(Select::new("Policy type:", POLICY_TYPES.to_vec()).prompt()?)?,
                };
                let form = PolicyForm {
                    name: ask_text("Policy name:", name)?,
                    description: ask_text("Description:", description)?,
                    applies_to: ask_text("Applies to:", applies_to)?,
                    policy_type: Some(policy_type),
                };
                render::print_policy(&self.send(IpcRequest::CreatePolicy(form)).await?);
            }
            Command::Activity { limit } => {
                render::print_activity(&self.send(IpcRequest::Activity { limit: Some(limit) }).await?)
            }
            Command::Alerts => render::print_alerts(&self.send(IpcRequest::Alerts).await?),
            Command::Resolve { id } => render::print_alert(&self.send(IpcRequest::ResolveAlert { id }).await?),
            Command::Notifications { limit } => {
                let response = self.send(IpcRequest::Notifications { limit: Some(limit) }).await?;
                self.last_toast = self.last_toast.max(newest_id(&response));
                render::print_notifications(&response);
            }
            Command::DeadLetters { limit } => {
                render::print_dead_letters(&self.send(IpcRequest::DeadLetters { limit: Some(limit) }).await?)
            }
            Command::Dashboard => render::print_dashboard(&self.send(IpcRequest::Dashboard).await?),
        }
        Ok(())
    }

    async fn send(&mut self, request: IpcRequest) -> Result<IpcResponse> {
        let toasts = !matches!(request, IpcRequest::Notifications { .. } | IpcRequest::Status);
        let response = self.client.send(&request).await?;
        if toasts {
            self.show_new_toasts().await;
        }
        Ok(response)
    }

    /// Marks everything already on the agent as seen.
    async fn catch_up_toasts(&mut self) {
        if let Ok(response) = self.client.send(&IpcRequest::Notifications { limit: Some(1) }).await {
            self.last_toast = newest_id(&response);
        }
    }

    async fn show_new_toasts(&mut self) {
        let Ok(response) = self.client.send(&IpcRequest::Notifications { limit: Some(10) }).await else {
            return;
        };
        let mut fresh: Vec<Notification> = serde_json::from_value::<Vec<Notification>>(
            response.data["notifications"].clone(),
        )
        .unwrap_or_default()
        .into_iter()
        .filter(|n| n.id > self.last_toast)
        .collect();
        fresh.reverse();
        for notification in &fresh {
            render::print_notification(notification);
        }
        self.last_toast = self.last_toast.max(newest_id(&response));
    }

    async fn live(&mut self) -> Result<()> {
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, Hide)?;
        let result = self.live_loop().await;
        execute!(io::stdout(), Show, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        result
    }

    async fn live_loop(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        let menu_items = ["View Alerts", "View Activity", "Back"];
        let mut menu_selected = 0;
        let mut counter: u64 = 0;

        loop {
            let status = self.client.send(&IpcRequest::Status).await.ok();
            let overview = self.client.send(&IpcRequest::Dashboard).await.ok();
            render_live(status.as_ref(), overview.as_ref(), &menu_items, menu_selected, counter)?;
            counter += 1;

            if event::poll(Duration::from_millis(100))? {
                match handle_live_input(&mut menu_selected, menu_items.len())? {
                    LiveAction::Exit => return Ok(()),
                    LiveAction::Select if menu_items[menu_selected] == "Back" => return Ok(()),
                    LiveAction::Select => {
                        execute!(stdout, Show, LeaveAlternateScreen)?;
                        disable_raw_mode()?;
                        let result = if menu_selected == 0 {
                            self.client.send(&IpcRequest::Alerts).await.map(|r| render::print_alerts(&r))
                        } else {
                            self.client
                                .send(&IpcRequest::Activity { limit: Some(15) })
                                .await
                                .map(|r| render::print_activity(&r))
                        };
                        if let Err(e) = result {
                            println!("{} {:#}", "✗ Error:".red().bold(), e);
                        }
                        println!("{}", "Press any key to return...".dimmed());
                        enable_raw_mode()?;
                        event::read()?;
                        execute!(stdout, EnterAlternateScreen, Hide)?;
                    }
                    LiveAction::None => {}
                }
            }

            sleep(Duration::from_millis(900)).await;
        }
    }
}

fn ask_text(label: &str, given: Option<String>) -> Result<String> {
    match given {
        Some(value) => Ok(value),
        None => Ok(Text::new(label).prompt()?),
    }
}

fn parse_policy_type(raw: &str) -> Result<PolicyType> {
    match serde_json::from_value(serde_json::Value::String(raw.to_lowercase())) {
        Ok(policy_type) => Ok(policy_type),
        Err(_) => bail!("unknown policy type '{}' (expected one of {})", raw, POLICY_TYPES.join(", ")),
    }
}

fn newest_id(response: &IpcResponse) -> u64 {
    response.data["notifications"][0]["id"].as_u64().unwrap_or(0)
}

fn show_welcome(socket: &str) {
    let rule = "══════════════════════════════════════════════════════════════";
    println!("\n{}", format!("╔{}╗", rule).bright_cyan());
    println!("{}", boxed("      ZTD - Zero Trust Dashboard (Interactive CLI)").bright_cyan().bold());
    println!("{}", format!("╠{}╣", rule).bright_cyan());
    for (command, help) in [
        ("/login [email]", "Sign in"),
        ("/signup [email]", "Create an account"),
        ("/logout", "Sign out"),
        ("/whoami", "Show the signed-in user"),
        ("/dashboard", "Security overview"),
        ("/users", "User profiles and trust scores"),
        ("/devices", "Registered devices"),
        ("/register", "Register a device"),
        ("/policies", "Access policies"),
        ("/policy", "Create a policy"),
        ("/activity [limit]", "Recent access activity"),
        ("/alerts", "Security alerts"),
        ("/resolve <id>", "Resolve an alert"),
        ("/notifications", "Recent notifications"),
        ("/deadletters", "Undelivered audit entries"),
        ("/open <path>", "Check where a page would take you"),
        ("/live", "Live dashboard"),
        ("/status", "Agent status"),
        ("/clear  /exit", "Clear the screen, leave"),
    ] {
        println!("{}", boxed(&format!("  {:20} {}", command, help)).bright_cyan());
    }
    println!("{}", boxed("").bright_cyan());
    println!("{}", boxed(&format!("  Agent: {}", socket)).bright_cyan().dimmed());
    println!("{}", boxed("  Tip: Type '/' to see command suggestions").bright_cyan().dimmed());
    println!("{}\n", format!("╚{}╝", rule).bright_cyan());
}

fn boxed(content: &str) -> String {
    let padding = 62usize.saturating_sub(display_width(content));
    format!("║{}{}║", content, " ".repeat(padding))
}

// Width without ANSI escape sequences
fn display_width(s: &str) -> usize {
    let mut width = 0;
    let mut in_escape = false;
    let mut in_bracket = false;

    for ch in s.chars() {
        if in_escape {
            if ch == '[' {
                in_bracket = true;
            } else if in_bracket && ch.is_ascii_alphabetic() {
                in_escape = false;
                in_bracket = false;
            } else if !in_bracket {
                in_escape = false;
            }
        } else if ch == '\x1b' {
            in_escape = true;
        } else {
            width += 1;
        }
    }

    width
}

enum LiveAction {
    Exit,
    Select,
    None,
}

fn handle_live_input(selected: &mut usize, items: usize) -> Result<LiveAction> {
    if let Event::Key(KeyEvent { code, modifiers, .. }) = event::read()? {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => return Ok(LiveAction::Exit),
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => return Ok(LiveAction::Exit),
            KeyCode::Up => *selected = selected.saturating_sub(1),
            KeyCode::Down => *selected = (*selected + 1).min(items.saturating_sub(1)),
            KeyCode::Enter => return Ok(LiveAction::Select),
            _ => {}
        }
    }
    Ok(LiveAction::None)
}

fn render_live(
    status: Option<&IpcResponse>,
    overview: Option<&IpcResponse>,
    menu_items: &[&str],
    selected: usize,
    counter: u64,
) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, MoveTo(0, 0), Clear(ClearType::All))?;

    let rule = "══════════════════════════════════════════════════════════════";
    let mut screen = String::new();
    let mut line = |text: String| {
        screen.push_str(&text);
        screen.push_str("\r\n");
    };

    line(format!("╔{}╗", rule).bright_cyan().to_string());
    line(boxed("           ZTD Live Security Dashboard").bright_cyan().bold().to_string());
    line(format!("╠{}╣", rule).bright_cyan().to_string());

    match status {
        Some(status) if status.success => {
            let data = &status.data;
            line(boxed(&format!(
                " {} {}   {} {}",
                "Agent:".bright_cyan(),
                data["status"].as_str().unwrap_or("unknown").green().bold(),
                "Uptime:".bright_cyan(),
                render::format_uptime(data["uptime_seconds"].as_u64().unwrap_or(0)).bright_white()
            )));
            line(boxed(&format!(
                " {} {}   {} {}",
                "Session:".bright_cyan(),
                data["session"].as_str().unwrap_or("?").bright_white(),
                "Backend:".bright_cyan(),
                data["backend"].as_str().unwrap_or("?").bright_white()
            )));
        }
        _ => line(boxed(&format!(" {} {}", "Agent:".bright_cyan(), "disconnected".red().bold()))),
    }

    line(format!("╠{}╣", rule).bright_cyan().to_string());
    match overview.map(|o| (o, o.error_message())) {
        Some((o, None)) => {
            let data = &o.data;
            for (label, value, color) in [
                ("Users", data["users"].as_u64().unwrap_or(0), Color::BrightWhite),
                ("Devices", data["devices"].as_u64().unwrap_or(0), Color::BrightWhite),
                ("Compliant devices", data["compliance"]["compliant"].as_u64().unwrap_or(0), Color::Green),
                ("Active policies", data["active_policies"].as_u64().unwrap_or(0), Color::BrightWhite),
                ("Active alerts", data["alerts"]["active"].as_u64().unwrap_or(0), Color::BrightYellow),
                ("Critical alerts", data["alerts"]["critical"].as_u64().unwrap_or(0), Color::BrightRed),
                ("Denied requests", data["activity"]["denied"].as_u64().unwrap_or(0), Color::Red),
            ] {
                line(boxed(&format!(" {:18} {}", format!("{}:", label).bright_cyan(), value.to_string().color(color).bold())));
            }
        }
        Some((_, Some(message))) => line(boxed(&format!(" {}", message.yellow()))),
        None => line(boxed(&format!(" {}", "No data".dimmed()))),
    }

    line(format!("╠{}╣", rule).bright_cyan().to_string());
    for (i, item) in menu_items.iter().enumerate() {
        let text = if i == selected {
            format!(" ▶ {}", item.bright_cyan().bold())
        } else {
            format!("   {}", item.bright_white())
        };
        line(boxed(&text));
    }
    line(format!("╠{}╣", rule).bright_cyan().to_string());
    line(boxed(&format!(" {} {}", "Updates:".bright_cyan(), format!("{} (refreshing every second)", counter).dimmed())));
    line(boxed(" Controls: ↑↓ Navigate | Enter Select | Q/Esc Exit").bright_cyan().dimmed().to_string());
    line(format!("╚{}╝", rule).bright_cyan().to_string());

    write!(stdout, "{}", screen)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &str) -> Command {
        match parse_input(line) {
            Some(Input::Run(command)) => command,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[test]
    fn slash_commands_parse_into_requests() {
        assert_eq!(run("/users"), Command::Users);
        assert_eq!(run("resolve 12"), Command::Resolve { id: "12".into() });
        assert_eq!(run("/activity"), Command::Activity { limit: 20 });
        assert_eq!(run("/deadletters 5"), Command::DeadLetters { limit: 5 });
        assert_eq!(run("/login a@example.com"), Command::Login { email: Some("a@example.com".into()) });
    }

    #[test]
    fn register_takes_flags() {
        assert_eq!(
            run("/register Laptop --type desktop --os Linux"),
            Command::Register {
                name: Some("Laptop".into()),
                device_type: Some("desktop".into()),
                os: Some("Linux".into()),
                location: None,
            }
        );
    }

    #[test]
    fn shell_words_are_handled_locally() {
        assert_eq!(parse_input("   "), None);
        assert_eq!(parse_input("/exit"), Some(Input::Exit));
        assert_eq!(parse_input("/help"), Some(Input::Help));
        assert!(matches!(parse_input("/resolve"), Some(Input::Invalid(_))));
        assert!(matches!(parse_input("/bogus"), Some(Input::Invalid(_))));
    }

    #[test]
    fn policy_types_parse_case_insensitively() {
        assert_eq!(parse_policy_type("Network").unwrap(), PolicyType::Network);
        assert!(parse_policy_type("firewall").is_err());
    }

    #[test]
    fn width_ignores_color_codes() {
        let colored = "abc".red().bold().to_string();
        assert_eq!(display_width(&colored), 3);
        assert_eq!(boxed("x").chars().count(), 64);
    }
}
