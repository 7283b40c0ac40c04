
#[derive(Debug, StructOpt)]
#[structopt(author, name="ldapq")]
/// Search an LDAP directory over StartTLS and print the matching entries.
struct LdapqOpt {
    #[structopt(short, long)]
    /// Display extended infomation during runtime.
    verbose: bool,

    #[structopt(short = "h", long = "hostname")]
    /// Hostname of the LDAP server. Also used to verify its certificate.
    hostname: Option<String>,

    #[structopt(long = "port")]
    /// Port of the LDAP server [default: 389]
    port: Option<u16>,

    #[structopt(short = "H", long = "url")]
    /// ldap://host:port of the LDAP server, in place of --hostname and --port
    url: Option<url::Url>,

    #[structopt(short = "b", long = "search-base")]
    /// Base of the LDAP search [default: dc=puppetlabs,dc=com]
    search_base: Option<String>,

    #[structopt(short = "u", long = "user-dn")]
    /// DN of user to connect as
    user_dn: Option<String>,

    #[structopt(short = "p", long = "password")]
    /// Password of user to connect as
    password: Option<String>,

    #[structopt(long = "ca", parse(from_os_str))]
    /// Additional PEM CA certificates to trust
    ca_file: Option<PathBuf>,

    #[structopt(short = "t", long = "timeout")]
    /// Seconds to wait for each network operation [default: 30]
    timeout: Option<u64>,

    #[structopt(short = "z", long = "size-limit")]
    /// Maximum number of entries to return, 0 for no limit
    size_limit: Option<i32>,

    #[structopt(short = "l", long = "time-limit")]
    /// Seconds the server may spend on the search, 0 for no limit
    time_limit: Option<i32>,

    #[structopt(short = "j", long = "json")]
    /// Print entries and errors as JSON on stdout
    json: bool,

    /// The search filter, for example (uid=jdoe)
    query: Option<String>,

    /// Attributes to return. All attributes if none are given.
    attributes: Vec<String>,
}
