//! Command handlers for the `hirewave` binary.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use hirewave_core::flags::OVERRIDES_FILE;
use hirewave_core::models::{Credentials, Registration, UserType};
use hirewave_core::utils::{contains_ignore_case, paginate, total_pages, truncate};
use hirewave_core::{ApiError, AuthSession, Config, FeatureFlags, LoginOutcome};

/// Jobs requested per page
const JOBS_PER_PAGE: u32 = 20;

/// Blog posts shown per page
const POSTS_PER_PAGE: usize = 10;

/// Width of the excerpt printed under each post
const SUMMARY_WIDTH: usize = 100;

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

fn parse_page(arg: Option<&String>) -> Result<u32> {
    match arg {
        Some(s) => match s.parse::<u32>() {
            Ok(page) if page >= 1 => Ok(page),
            _ => anyhow::bail!("Page must be a positive number, got '{}'", s),
        },
        None => Ok(1),
    }
}

fn report_api_error(e: &ApiError) -> Result<()> {
    warn!(error = %e, "Request failed");
    anyhow::bail!("{}", e.user_message())
}

fn report_login(outcome: LoginOutcome, session: &AuthSession) -> Result<bool> {
    if !outcome.success {
        eprintln!(
            "Login failed: {}",
            outcome.message.as_deref().unwrap_or("Login failed")
        );
        return Ok(false);
    }
    let name = session
        .user()
        .map(|u| u.display_name())
        .unwrap_or_default();
    println!("Signed in as {}", name);
    Ok(true)
}

/// `login [--otp] [email]`
pub async fn login(session: &AuthSession, mut config: Config, args: &[String]) -> Result<()> {
    let use_otp = args.iter().any(|a| a == "--otp");
    let email_arg = args.iter().find(|a| !a.starts_with("--")).cloned();

    if let Some(user) = session.user() {
        println!("Already signed in as {}. Run 'hirewave logout' first.", user.display_name());
        return Ok(());
    }

    let email = match email_arg.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    let signed_in = if use_otp {
        let requested = session.request_otp(&email).await;
        if !requested.success {
            eprintln!(
                "Could not send code: {}",
                requested.message.as_deref().unwrap_or("unknown error")
            );
            return Ok(());
        }
        println!(
            "{}",
            requested
                .message
                .as_deref()
                .unwrap_or("A sign-in code was sent to your email.")
        );
        let code = prompt("Code: ")?;
        let referral = prompt("Referral code (optional): ")?;
        let referral = (!referral.is_empty()).then_some(referral.as_str());
        report_login(session.verify_otp(&email, &code, referral).await, session)?
    } else {
        let password = rpassword::prompt_password("Password: ")
            .context("Failed to read password")?;
        let credentials = Credentials::new(email.clone(), password);
        report_login(session.login(&credentials).await, session)?
    };

    if signed_in {
        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to remember last email");
        }
    }
    Ok(())
}

/// `register [email]`
pub async fn register(session: &AuthSession, mut config: Config, args: &[String]) -> Result<()> {
    let email = match args.first() {
        Some(email) => email.clone(),
        None => prompt("Email: ")?,
    };
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    let first_name = prompt("First name (optional): ")?;
    let last_name = prompt("Last name (optional): ")?;
    let user_type = match prompt("Account type [jobseeker/recruiter]: ")?.as_str() {
        "" | "jobseeker" => UserType::Jobseeker,
        "recruiter" => UserType::Recruiter,
        other => anyhow::bail!("Unknown account type '{}'", other),
    };
    let referral_code = prompt("Referral code (optional): ")?;
    let registration = Registration {
        email: email.clone(),
        first_name: (!first_name.is_empty()).then_some(first_name),
        last_name: (!last_name.is_empty()).then_some(last_name),
        user_type: Some(user_type),
        referral_code,
    };

    let registered = session.register(&registration).await;
    if !registered.success {
        eprintln!(
            "Registration failed: {}",
            registered.message.as_deref().unwrap_or("unknown error")
        );
        return Ok(());
    }
    println!(
        "{}",
        registered
            .message
            .as_deref()
            .unwrap_or("A verification code was sent to your email.")
    );

    let code = prompt("Code: ")?;
    let referral = (!registration.referral_code.is_empty())
        .then_some(registration.referral_code.as_str());
    if report_login(session.verify_otp(&email, &code, referral).await, session)? {
        config.last_email = Some(email);
        if let Err(e) = config.save() {
            warn!(error = %e, "Failed to remember last email");
        }
    }
    Ok(())
}

pub async fn logout(session: &AuthSession) -> Result<()> {
    if session.server_logout().await {
        println!("Signed out.");
    } else {
        println!("Signed out on this device. The server could not be reached to end the session.");
    }
    Ok(())
}

/// `whoami [--json]`
pub fn whoami(session: &AuthSession, args: &[String]) -> Result<()> {
    let Some(user) = session.user() else {
        println!("Not signed in.");
        return Ok(());
    };

    if args.iter().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&user)?);
        return Ok(());
    }

    println!("{}", user.display_name());
    if let Some(ref email) = user.email {
        println!("  Email: {}", email);
    }
    if let Some(user_type) = user.user_type {
        println!("  Role:  {}", user_type.display_name());
    }
    if user.is_admin() {
        println!("  Admin: yes");
    }
    Ok(())
}

pub fn status(session: &AuthSession, config: &Config, data_dir: &Path) -> Result<()> {
    let snapshot = session.snapshot();
    println!("API:           {}", config.api_base_url);
    println!("Mode:          {:?}", config.mode);
    println!("Data dir:      {}", data_dir.display());
    println!("Token stored:  {}", if session.has_token() { "yes" } else { "no" });
    println!(
        "Session:       {}",
        match (&snapshot.user, snapshot.is_authenticated) {
            (Some(user), true) => format!("signed in as {}", user.display_name()),
            _ => "signed out".to_string(),
        }
    );
    println!(
        "Cached admin:  {}",
        if session.tokens().cached_admin_flag() { "yes" } else { "no" }
    );
    Ok(())
}

/// `flags [list [filter]] | set <flag> <on|off> | reset`
pub fn flags(config: &Config, args: &[String]) -> Result<()> {
    let path = Config::config_dir()?.join(OVERRIDES_FILE);
    let mut flags = FeatureFlags::load(config.mode, path);

    match args.first().map(String::as_str) {
        None | Some("list") => {
            let filter = args.get(1).map(String::as_str).unwrap_or("");
            for flag in flags.all().iter().filter(|f| contains_ignore_case(&f.name, filter)) {
                println!(
                    "{:<26} {:<4}{}",
                    flag.name,
                    if flag.enabled { "on" } else { "off" },
                    if flag.overridden { " (override)" } else { "" }
                );
            }
            Ok(())
        }
        Some("set") => {
            let (Some(name), Some(value)) = (args.get(1), args.get(2)) else {
                anyhow::bail!("Usage: hirewave flags set <flag> <on|off>");
            };
            let enabled = match value.as_str() {
                "on" | "true" => true,
                "off" | "false" => false,
                other => anyhow::bail!("Expected on or off, got '{}'", other),
            };
            flags.set_override(name, enabled)?;
            println!("{} is now {}", name, if enabled { "on" } else { "off" });
            Ok(())
        }
        Some("reset") => {
            flags.reset_overrides()?;
            println!("Feature flag overrides cleared.");
            Ok(())
        }
        Some(other) => anyhow::bail!("Unknown flags subcommand: {}", other),
    }
}

/// `jobs [page]`
pub async fn jobs(session: &AuthSession, args: &[String]) -> Result<()> {
    let page = parse_page(args.first())?;
    let result = session
        .submit(|api| async move { api.fetch_jobs(page, JOBS_PER_PAGE).await })
        .await;

    let jobs = match result {
        Ok(jobs) => jobs,
        Err(e) => return report_api_error(&e),
    };
    debug!(count = jobs.count, page, "Fetched jobs");

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }
    for job in &jobs.results {
        println!(
            "#{:<6} {:<8} {}",
            job.id,
            job.status.display_name(),
            job.headline()
        );
    }
    let pages = total_pages(jobs.count, JOBS_PER_PAGE as usize);
    println!("\nPage {} of {} ({} jobs)", page, pages.max(1), jobs.count);
    if jobs.has_next() {
        println!("Next: hirewave jobs {}", page + 1);
    }
    Ok(())
}

/// `blog [page]`
pub async fn blog(session: &AuthSession, args: &[String]) -> Result<()> {
    let page = parse_page(args.first())? as usize;
    let result = session
        .submit(|api| async move {
            let (posts, categories) =
                futures::join!(api.fetch_blog_posts(), api.fetch_blog_categories());
            Ok::<_, ApiError>((posts?, categories?))
        })
        .await;

    let (posts, categories) = match result {
        Ok(fetched) => fetched,
        Err(e) => return report_api_error(&e),
    };

    if !categories.is_empty() {
        let names: Vec<String> = categories
            .results
            .iter()
            .map(|c| format!("{} ({})", c.name, c.count))
            .collect();
        println!("Categories: {}\n", names.join(", "));
    }

    let shown = paginate(&posts.results, page, POSTS_PER_PAGE);
    if shown.is_empty() {
        println!("No posts found.");
        return Ok(());
    }
    for post in shown {
        println!(
            "{}{}",
            truncate(&post.title, 70),
            if post.featured { "  [featured]" } else { "" }
        );
        println!("    {}", post.summary(SUMMARY_WIDTH));
    }
    println!(
        "\nPage {} of {}",
        page,
        total_pages(posts.results.len(), POSTS_PER_PAGE)
    );
    Ok(())
}
