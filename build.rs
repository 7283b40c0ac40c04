#![allow(dead_code)]

use std::env;

use std::path::PathBuf;
use structopt::clap::Shell;
use structopt::StructOpt;

include!("src/ldapq_opt.rs");

fn main() {
    let outdir = match env::var_os("OUT_DIR") {
        None => return,
        Some(outdir) => outdir,
    };

    // OUT_DIR is <target>/<profile>/build/ldap_query-<hash>/out, completions
    // go alongside the binaries in <target>/<profile>/completions
    let comp_dir = PathBuf::from(outdir)
        .ancestors()
        .nth(3)
        .map(|p| p.join("completions"))
        .expect("Unable to process completions path");

    if !comp_dir.exists() {
        std::fs::create_dir(&comp_dir).expect("Unable to create completions dir");
    }

    LdapqOpt::clap().gen_completions("ldapq", Shell::Bash, comp_dir.clone());
    LdapqOpt::clap().gen_completions("ldapq", Shell::Zsh, comp_dir);

    println!("cargo:rerun-if-changed=src/ldapq_opt.rs");
}
