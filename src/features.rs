//! Connection features (NSL-KDD schema)

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ValidationError;

/// Accepted `protocol_type` values.
pub const PROTOCOL_TYPES: &[&str] = &["tcp", "udp", "icmp"];

/// Accepted TCP `flag` values.
pub const FLAGS: &[&str] = &[
    "SF", "S0", "REJ", "RSTO", "RSTOS0", "RSTR", "S1", "S2", "S3", "OTH", "SH",
];

/// Accepted `service` values.
pub const SERVICES: &[&str] = &[
    "http", "ftp", "smtp", "ssh", "dns", "ftp_data", "telnet", "finger", "eco_i", "other",
    "private", "domain_u", "auth", "imap4", "pop_3", "urp_i", "netbios_ns", "netbios_dgm",
    "netbios_ssn", "IRC", "X11", "Z39_50", "aol", "bgp", "courier", "csnet_ns", "ctf",
    "daytime", "discard", "echo", "ecr_i", "efs", "exec", "gopher", "harvest", "hostnames",
    "http_443", "http_8001", "icmp", "iso_tsap", "klogin", "kshell", "ldap", "link", "login",
    "mtp", "name", "netstat", "nnsp", "nntp", "ntp_u", "pm_dump", "pop_2", "printer", "red_i",
    "remote_job", "rje", "shell", "sql_net", "sunrpc", "supdup", "systat", "tftp_u", "tim_i",
    "time", "urh_i", "uucp", "uucp_path", "vmnet", "whois",
];

/// One network connection's attribute set, as defined by the NSL-KDD schema.
///
/// Missing fields take the dataset's baseline defaults (a plain TCP/HTTP
/// connection), so a client only has to send the fields it cares about.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ConnectionRecord {
    /// Connection duration in seconds
    pub duration: u64,
    /// Transport protocol: tcp, udp or icmp
    pub protocol_type: String,
    /// Destination service (http, ftp, smtp, ...)
    pub service: String,
    /// TCP status flag (SF, S0, REJ, ...)
    pub flag: String,
    /// Bytes sent from source to destination
    pub src_bytes: u64,
    /// Bytes sent from destination to source
    pub dst_bytes: u64,
    /// 1 if source and destination host/port coincide
    pub land: u8,
    /// Number of wrong fragments
    pub wrong_fragment: u64,
    /// Number of urgent packets
    pub urgent: u64,
    /// Number of accesses to sensitive directories
    pub hot: u64,
    /// Failed login attempts
    pub num_failed_logins: u64,
    /// 1 if the login succeeded
    pub logged_in: u8,
    /// Number of compromised conditions
    pub num_compromised: u64,
    /// 1 if a root shell was obtained
    pub root_shell: u8,
    /// 1 if su/sudo was attempted
    pub su_attempted: u8,
    /// Number of root accesses
    pub num_root: u64,
    /// Number of file creation operations
    pub num_file_creations: u64,
    /// Number of shells started
    pub num_shells: u64,
    /// Accesses to access-control files
    pub num_access_files: u64,
    /// Outbound commands in an ftp session
    pub num_outbound_cmds: u64,
    /// 1 if the login belongs to the host list
    pub is_host_login: u8,
    /// 1 if the login is a guest login
    pub is_guest_login: u8,
    /// Connections to the same host in the past two seconds
    pub count: u32,
    /// Connections to the same service in the past two seconds
    pub srv_count: u32,
    /// Fraction of connections with SYN errors
    pub serror_rate: f64,
    /// Fraction of same-service connections with SYN errors
    pub srv_serror_rate: f64,
    /// Fraction of connections with REJ errors
    pub rerror_rate: f64,
    /// Fraction of same-service connections with REJ errors
    pub srv_rerror_rate: f64,
    /// Fraction of connections to the same service
    pub same_srv_rate: f64,
    /// Fraction of connections to different services
    pub diff_srv_rate: f64,
    /// Fraction of same-service connections to different hosts
    pub srv_diff_host_rate: f64,
    /// Connections to the same destination host
    pub dst_host_count: u32,
    /// Connections to the same destination service
    pub dst_host_srv_count: u32,
    /// Fraction of destination-host connections to the same service
    pub dst_host_same_srv_rate: f64,
    /// Fraction of destination-host connections to different services
    pub dst_host_diff_srv_rate: f64,
    /// Fraction of destination-host connections from the same source port
    pub dst_host_same_src_port_rate: f64,
    /// Fraction of destination-service connections to different hosts
    pub dst_host_srv_diff_host_rate: f64,
    /// Fraction of destination-host connections with SYN errors
    pub dst_host_serror_rate: f64,
    /// Fraction of destination-service connections with SYN errors
    pub dst_host_srv_serror_rate: f64,
    /// Fraction of destination-host connections with REJ errors
    pub dst_host_rerror_rate: f64,
    /// Fraction of destination-service connections with REJ errors
    pub dst_host_srv_rerror_rate: f64,
}

impl Default for ConnectionRecord {
    fn default() -> Self {
        Self {
            duration: 0,
            protocol_type: "tcp".into(),
            service: "http".into(),
            flag: "SF".into(),
            src_bytes: 0,
            dst_bytes: 0,
            land: 0,
            wrong_fragment: 0,
            urgent: 0,
            hot: 0,
            num_failed_logins: 0,
            logged_in: 0,
            num_compromised: 0,
            root_shell: 0,
            su_attempted: 0,
            num_root: 0,
            num_file_creations: 0,
            num_shells: 0,
            num_access_files: 0,
            num_outbound_cmds: 0,
            is_host_login: 0,
            is_guest_login: 0,
            count: 1,
            srv_count: 1,
            serror_rate: 0.0,
            srv_serror_rate: 0.0,
            rerror_rate: 0.0,
            srv_rerror_rate: 0.0,
            same_srv_rate: 1.0,
            diff_srv_rate: 0.0,
            srv_diff_host_rate: 0.0,
            dst_host_count: 1,
            dst_host_srv_count: 1,
            dst_host_same_srv_rate: 1.0,
            dst_host_diff_srv_rate: 0.0,
            dst_host_same_src_port_rate: 0.0,
            dst_host_srv_diff_host_rate: 0.0,
            dst_host_serror_rate: 0.0,
            dst_host_srv_serror_rate: 0.0,
            dst_host_rerror_rate: 0.0,
            dst_host_srv_rerror_rate: 0.0,
        }
    }
}

/// A single column value, numeric or categorical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    /// Numeric column
    Numeric(f64),
    /// Categorical column (protocol_type, service, flag)
    Categorical(&'a str),
}

impl ConnectionRecord {
    /// Look up a column by its NSL-KDD name.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        use FieldValue::{Categorical, Numeric};
        let value = match name {
            "duration" => Numeric(self.duration as f64),
            "protocol_type" => Categorical(&self.protocol_type),
            "service" => Categorical(&self.service),
            "flag" => Categorical(&self.flag),
            "src_bytes" => Numeric(self.src_bytes as f64),
            "dst_bytes" => Numeric(self.dst_bytes as f64),
            "land" => Numeric(self.land as f64),
            "wrong_fragment" => Numeric(self.wrong_fragment as f64),
            "urgent" => Numeric(self.urgent as f64),
            "hot" => Numeric(self.hot as f64),
            "num_failed_logins" => Numeric(self.num_failed_logins as f64),
            "logged_in" => Numeric(self.logged_in as f64),
            "num_compromised" => Numeric(self.num_compromised as f64),
            "root_shell" => Numeric(self.root_shell as f64),
            "su_attempted" => Numeric(self.su_attempted as f64),
            "num_root" => Numeric(self.num_root as f64),
            "num_file_creations" => Numeric(self.num_file_creations as f64),
            "num_shells" => Numeric(self.num_shells as f64),
            "num_access_files" => Numeric(self.num_access_files as f64),
            "num_outbound_cmds" => Numeric(self.num_outbound_cmds as f64),
            "is_host_login" => Numeric(self.is_host_login as f64),
            "is_guest_login" => Numeric(self.is_guest_login as f64),
            "count" => Numeric(self.count as f64),
            "srv_count" => Numeric(self.srv_count as f64),
            "serror_rate" => Numeric(self.serror_rate),
            "srv_serror_rate" => Numeric(self.srv_serror_rate),
            "rerror_rate" => Numeric(self.rerror_rate),
            "srv_rerror_rate" => Numeric(self.srv_rerror_rate),
            "same_srv_rate" => Numeric(self.same_srv_rate),
            "diff_srv_rate" => Numeric(self.diff_srv_rate),
            "srv_diff_host_rate" => Numeric(self.srv_diff_host_rate),
            "dst_host_count" => Numeric(self.dst_host_count as f64),
            "dst_host_srv_count" => Numeric(self.dst_host_srv_count as f64),
            "dst_host_same_srv_rate" => Numeric(self.dst_host_same_srv_rate),
            "dst_host_diff_srv_rate" => Numeric(self.dst_host_diff_srv_rate),
            "dst_host_same_src_port_rate" => Numeric(self.dst_host_same_src_port_rate),
            "dst_host_srv_diff_host_rate" => Numeric(self.dst_host_srv_diff_host_rate),
            "dst_host_serror_rate" => Numeric(self.dst_host_serror_rate),
            "dst_host_srv_serror_rate" => Numeric(self.dst_host_srv_serror_rate),
            "dst_host_rerror_rate" => Numeric(self.dst_host_rerror_rate),
            "dst_host_srv_rerror_rate" => Numeric(self.dst_host_srv_rerror_rate),
            _ => return None,
        };
        Some(value)
    }

    /// Validate declared ranges and categorical membership.
    ///
    /// Runs at the API boundary; records that pass here are accepted by the
    /// preprocessing pipeline unconditionally.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !PROTOCOL_TYPES.contains(&self.protocol_type.as_str()) {
            return Err(ValidationError::new(
                "protocol_type",
                format!("unknown protocol `{}`", self.protocol_type),
            ));
        }
        if !SERVICES.contains(&self.service.as_str()) {
            return Err(ValidationError::new(
                "service",
                format!("unknown service `{}`", self.service),
            ));
        }
        if !FLAGS.contains(&self.flag.as_str()) {
            return Err(ValidationError::new(
                "flag",
                format!("unknown flag `{}`", self.flag),
            ));
        }

        let binary = [
            ("land", self.land),
            ("logged_in", self.logged_in),
            ("root_shell", self.root_shell),
            ("su_attempted", self.su_attempted),
            ("is_host_login", self.is_host_login),
            ("is_guest_login", self.is_guest_login),
        ];
        for (name, value) in binary {
            if value > 1 {
                return Err(ValidationError::new(name, "must be 0 or 1".into()));
            }
        }

        let bounded = [
            ("count", self.count, 512),
            ("srv_count", self.srv_count, 512),
            ("dst_host_count", self.dst_host_count, 255),
            ("dst_host_srv_count", self.dst_host_srv_count, 255),
        ];
        for (name, value, max) in bounded {
            if value > max {
                return Err(ValidationError::new(name, format!("must be at most {max}")));
            }
        }

        let rates = [
            ("serror_rate", self.serror_rate),
            ("srv_serror_rate", self.srv_serror_rate),
            ("rerror_rate", self.rerror_rate),
            ("srv_rerror_rate", self.srv_rerror_rate),
            ("same_srv_rate", self.same_srv_rate),
            ("diff_srv_rate", self.diff_srv_rate),
            ("srv_diff_host_rate", self.srv_diff_host_rate),
            ("dst_host_same_srv_rate", self.dst_host_same_srv_rate),
            ("dst_host_diff_srv_rate", self.dst_host_diff_srv_rate),
            ("dst_host_same_src_port_rate", self.dst_host_same_src_port_rate),
            ("dst_host_srv_diff_host_rate", self.dst_host_srv_diff_host_rate),
            ("dst_host_serror_rate", self.dst_host_serror_rate),
            ("dst_host_srv_serror_rate", self.dst_host_srv_serror_rate),
            ("dst_host_rerror_rate", self.dst_host_rerror_rate),
            ("dst_host_srv_rerror_rate", self.dst_host_srv_rerror_rate),
        ];
        for (name, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::new(name, "must be in [0, 1]".into()));
            }
        }

        Ok(())
    }
}
