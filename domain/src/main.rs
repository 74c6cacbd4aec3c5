use std::env;
use std::process;
use std::time::SystemTime;

use domain::adapters::memory_repo::InMemoryAccountRepo;
use domain::service::AccountService;
use domain::video::VideoId;
use domain::{
    AccountRole, Clock, CoreError, Email, NewAccount, ReservedUsernames,
};

struct StdClock;
impl Clock for StdClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  domain register <email> <username> [--role individual|business]\n  domain check <username>\n  domain normalize <text>\n  domain video-id <url>\n\nNotes:\n  - This demo CLI uses an in-memory repository; data is not persisted across runs.",
        domain::about()
    );
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1); // skip program name

    let Some(cmd) = args.next() else {
        print_usage();
        return Ok(());
    };

    // Construct a demo service with in-memory storage
    let repo = InMemoryAccountRepo::new();
    let reserved = ReservedUsernames::builtin();
    let clock = StdClock;
    let svc = AccountService::new(repo, reserved, clock);

    match cmd.as_str() {
        "register" => {
            let Some(email_str) = args.next() else {
                return Err("missing <email> for register".into());
            };
            let Some(username) = args.next() else {
                return Err("missing <username> for register".into());
            };
            let email = match Email::new(email_str) {
                Ok(e) => e,
                Err(_) => return Err("invalid email".into()),
            };

            // Parse the single optional flag: --role <kind>
            let mut role = AccountRole::Individual;
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--role" => {
                        if i + 1 >= rest.len() {
                            return Err("--role requires a value".into());
                        }
                        match AccountRole::parse(&rest[i + 1]) {
                            Some(r) => role = r,
                            None => return Err("role must be individual or business".into()),
                        }
                        i += 2;
                    }
                    unk => {
                        return Err(format!("unknown argument: {}", unk));
                    }
                }
            }

            let input = NewAccount {
                id: "demo-1".into(),
                email,
                username,
                role,
                phone: None,
                full_name: None,
            };
            match svc.register(input) {
                Ok(account) => {
                    println!(
                        "registered: {} ({})",
                        account.username.as_str(),
                        account.role.as_str()
                    );
                    Ok(())
                }
                Err(e) => Err(format!("register failed: {}", e)),
            }
        }
        "check" => {
            let Some(candidate) = args.next() else {
                return Err("missing <username> for check".into());
            };
            match svc.check_username(&candidate) {
                Ok(username) => {
                    println!("available: {}", username.as_str());
                    Ok(())
                }
                Err(CoreError::InvalidUsername(issue)) => {
                    println!("unavailable ({}): {}", issue.code(), issue.message());
                    Ok(())
                }
                Err(e) => Err(format!("check failed: {}", e)),
            }
        }
        "normalize" => {
            let Some(text) = args.next() else {
                return Err("missing <text> for normalize".into());
            };
            println!("{}", domain::slug::normalize(&text));
            Ok(())
        }
        "video-id" => {
            let Some(url) = args.next() else {
                return Err("missing <url> for video-id".into());
            };
            match VideoId::from_url(&url) {
                Some(id) => {
                    println!("{}", id.as_str());
                    Ok(())
                }
                None => Err("no identifier".into()),
            }
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn main() {
    if let Err(msg) = run() {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
