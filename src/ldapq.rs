use ldapquery::*;
use std::path::PathBuf;
use structopt::StructOpt;

include!("./ldapq_opt.rs");

fn overrides(opt: LdapqOpt) -> ConfigOverrides {
    ConfigOverrides {
        hostname: opt.hostname,
        port: opt.port,
        url: opt.url,
        search_base: opt.search_base,
        user_dn: opt.user_dn,
        password: opt.password,
        ca_file: opt.ca_file,
        timeout_secs: opt.timeout,
        size_limit: opt.size_limit,
        time_limit: opt.time_limit,
        json: opt.json,
        query: opt.query,
        attributes: opt.attributes,
    }
}

fn fail(e: LdapError, json: bool) -> ! {
    if json {
        match serde_json::to_string_pretty(&e) {
            Ok(s) => println!("{}", s),
            Err(se) => error!("Failed to serialise error - {:?}", se),
        }
    } else {
        error!("{}", e);
    }
    std::process::exit(e.exit_code());
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let opt = LdapqOpt::from_args();
    ldapquery::start_tracing(opt.verbose);
    info!("ldapq command line utility");

    let json = opt.json;

    let mut config = match Config::from_env(overrides(opt)) {
        Ok(c) => c,
        Err(e) => fail(e, json),
    };

    if config.bind_password.is_none() {
        if json {
            fail(LdapError::PasswordNotFound, json);
        }
        match rpassword::prompt_password_stderr(&format!("Enter password for {}: ", config.bind_dn))
        {
            Ok(p) => config.bind_password = Some(p),
            Err(e) => {
                error!("Failed to get bind password - {}", e);
                fail(LdapError::PasswordNotFound, json);
            }
        }
    }

    let result = {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        run_query(&config, &mut out).await
    };

    match result {
        Ok(count) => debug!(count, "done"),
        Err(e) => fail(e, json),
    }
}
