use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::{
    auth::{User, UserStore},
    dataset::Dataset,
    filter::FilterState,
    query::{Extractor, View},
    report,
    settings::ForecastSettings,
};

const HELP: &str = "\
Commands:
  /help                    show this help
  /profile                 show the logged-in user
  /filters                 show the current filters
  /reset                   clear all filters
  /view <name>             switch the report view
  /country <a>, <b>, ...   filter by countries (empty for all)
  /category <a>, <b>, ...  filter by categories (empty for all)
  /dates <start> <end>     filter by order date, YYYY-MM-DD
  /product <name>          show the sales trend of one product (empty for the first)
  /logout                  log out
  exit | quit              leave the dashboard
Anything else is read as a question, e.g. \"furniture sales in France 2021-2022\".";

const NO_DATA: &str = "No data found for the selected filters.";

/// What the front end should do with a handled line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Nothing to print; show the next prompt.
    Silent,
    Quit,
}

enum Stage {
    Username,
    Password(String),
    Ready(User),
}

/// One user's interactive dashboard.
pub struct Session<'a> {
    dataset: &'a Dataset,
    users: &'a UserStore,
    extractor: &'a dyn Extractor,
    forecast: &'a ForecastSettings,
    filters: FilterState,
    stage: Stage,
}

impl<'a> Session<'a> {
    pub fn new(
        dataset: &'a Dataset,
        users: &'a UserStore,
        extractor: &'a dyn Extractor,
        forecast: &'a ForecastSettings,
    ) -> Self {
        Self {
            dataset,
            users,
            extractor,
            forecast,
            filters: FilterState::new(dataset),
            stage: Stage::Username,
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self.stage {
            Stage::Username => "Username: ",
            Stage::Password(_) => "Password: ",
            Stage::Ready(_) => "> ",
        }
    }

    /// Whether the next line is a password and should not be echoed.
    pub fn wants_password(&self) -> bool {
        matches!(self.stage, Stage::Password(_))
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    /// Handles one line of input.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid command arguments or a filter selection
    /// that cannot be applied. The session stays usable afterwards.
    pub async fn handle(&mut self, line: &str) -> Result<Reply> {
        let line = line.trim();
        let quit = line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit");
        if quit && !self.wants_password() {
            return Ok(Reply::Quit);
        }

        match std::mem::replace(&mut self.stage, Stage::Username) {
            Stage::Username => {
                if !line.is_empty() {
                    self.stage = Stage::Password(line.to_string());
                }
                Ok(Reply::Silent)
            }
            Stage::Password(username) => Ok(self.login(&username, line)),
            Stage::Ready(user) => {
                self.stage = Stage::Ready(user);
                self.command(line).await
            }
        }
    }

    fn login(&mut self, username: &str, password: &str) -> Reply {
        let Some(user) = self.users.check_credentials(username, password) else {
            warn!("Failed login for {username}");
            return Reply::Text("Invalid username or password.".to_string());
        };
        info!("{} logged in as {}", user.username, user.role);
        let welcome = format!(
            "Welcome, {}! You are logged in as {}.\nType /help for commands, or ask a question.",
            user.full_name(),
            user.role
        );
        self.filters.reset(self.dataset);
        self.stage = Stage::Ready(user.clone());
        Reply::Text(welcome)
    }

    async fn command(&mut self, line: &str) -> Result<Reply> {
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "" => Ok(Reply::Silent),
            "/help" => Ok(Reply::Text(HELP.to_string())),
            "/profile" => Ok(Reply::Text(self.profile())),
            "/filters" => Ok(Reply::Text(self.filters.to_string())),
            "/reset" => {
                self.filters.reset(self.dataset);
                self.report()
            }
            "/view" => {
                self.filters.set_view(argument.parse::<View>()?);
                self.report()
            }
            "/country" => {
                self.filters.set_countries(&list(argument), self.dataset);
                self.report()
            }
            "/category" => {
                self.filters.set_categories(&list(argument), self.dataset);
                self.report()
            }
            "/dates" => {
                let (start, end) = dates(argument)?;
                self.filters.set_dates(start, end);
                self.report()
            }
            "/product" => {
                self.filters.set_product(argument, self.dataset)?;
                self.filters.set_view(View::ProductPerformance);
                self.report()
            }
            "/logout" => {
                if let Stage::Ready(user) = &self.stage {
                    info!("{} logged out", user.username);
                }
                self.stage = Stage::Username;
                self.filters.reset(self.dataset);
                Ok(Reply::Text("Logged out.".to_string()))
            }
            _ if command.starts_with('/') => {
                bail!("Unknown command {command}. Type /help for commands.")
            }
            _ => {
                let query = self.extractor.extract(line).await;
                self.filters.apply(&query, self.dataset);
                self.report()
            }
        }
    }

    fn profile(&self) -> String {
        match &self.stage {
            Stage::Ready(user) => format!(
                "Name: {}\nUsername: {}\nRole: {}",
                user.full_name(),
                user.username,
                user.role
            ),
            _ => "Not logged in.".to_string(),
        }
    }

    fn report(&self) -> Result<Reply> {
        let Stage::Ready(user) = &self.stage else {
            bail!("Not logged in.");
        };
        let orders = self.filters.select(self.dataset)?;
        if orders.is_empty() {
            return Ok(Reply::Text(NO_DATA.to_string()));
        }
        let report = report::build(
            self.filters.view(),
            &orders,
            self.forecast,
            self.filters.product(),
        );
        Ok(Reply::Text(report.render(user.role)))
    }
}

fn list(argument: &str) -> Vec<String> {
    argument
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn dates(argument: &str) -> Result<(NaiveDate, NaiveDate)> {
    let mut parts = argument.split_whitespace();
    let (Some(start), Some(end), None) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Usage: /dates <start> <end>, e.g. /dates 2021-01-01 2021-12-31");
    };
    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid date: {s}"))
    };
    Ok((parse(start)?, parse(end)?))
}
