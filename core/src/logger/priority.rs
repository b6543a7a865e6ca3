//! Syslog priorities and facilities
//!
//! Numbering follows syslog: a lower priority value is more urgent.

/// Log message priority (syslog severity)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    Emerg = 0,
    Alert = 1,
    Crit = 2,
    Err = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

const PRIORITIES: [(Priority, &str); 8] = [
    (Priority::Emerg, "EMERG"),
    (Priority::Alert, "ALERT"),
    (Priority::Crit, "CRIT"),
    (Priority::Err, "ERR"),
    (Priority::Warning, "WARNING"),
    (Priority::Notice, "NOTICE"),
    (Priority::Info, "INFO"),
    (Priority::Debug, "DEBUG"),
];

impl Priority {
    /// Case-insensitive lookup by name (`"err"`, `"WARNING"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        PRIORITIES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|&(p, _)| p)
    }

    pub fn name(self) -> &'static str {
        PRIORITIES[self as usize].1
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        PRIORITIES.get(value as usize).map(|&(p, _)| p)
    }
}

impl core::fmt::Display for Priority {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Syslog facility
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Facility {
    Kern = 0,
    User = 1,
    Mail = 2,
    Daemon = 3,
    Auth = 4,
    Syslog = 5,
    Lpr = 6,
    News = 7,
    Uucp = 8,
    Cron = 9,
    AuthPriv = 10,
    Ftp = 11,
    Local0 = 16,
    Local1 = 17,
    Local2 = 18,
    Local3 = 19,
    Local4 = 20,
    Local5 = 21,
    Local6 = 22,
    Local7 = 23,
}

const FACILITIES: [(Facility, &str); 20] = [
    (Facility::Kern, "KERN"),
    (Facility::User, "USER"),
    (Facility::Mail, "MAIL"),
    (Facility::Daemon, "DAEMON"),
    (Facility::Auth, "AUTH"),
    (Facility::Syslog, "SYSLOG"),
    (Facility::Lpr, "LPR"),
    (Facility::News, "NEWS"),
    (Facility::Uucp, "UUCP"),
    (Facility::Cron, "CRON"),
    (Facility::AuthPriv, "AUTHPRIV"),
    (Facility::Ftp, "FTP"),
    (Facility::Local0, "LOCAL0"),
    (Facility::Local1, "LOCAL1"),
    (Facility::Local2, "LOCAL2"),
    (Facility::Local3, "LOCAL3"),
    (Facility::Local4, "LOCAL4"),
    (Facility::Local5, "LOCAL5"),
    (Facility::Local6, "LOCAL6"),
    (Facility::Local7, "LOCAL7"),
];

impl Facility {
    pub fn from_name(name: &str) -> Option<Self> {
        FACILITIES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name.trim()))
            .map(|&(f, _)| f)
    }

    pub fn name(self) -> &'static str {
        FACILITIES
            .iter()
            .find(|(f, _)| *f == self)
            .map_or("", |&(_, n)| n)
    }

    /// Facility code as used in the syslog PRI field (`facility * 8 + severity`).
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_names_round_trip() {
        for value in 0..8u8 {
            let p = Priority::from_u8(value).unwrap();
            assert_eq!(Priority::from_name(p.name()), Some(p));
        }
        assert_eq!(Priority::from_u8(8), None);
    }

    #[test]
    fn priority_lookup_is_case_insensitive() {
        assert_eq!(Priority::from_name("warning"), Some(Priority::Warning));
        assert_eq!(Priority::from_name(" Err "), Some(Priority::Err));
        assert_eq!(Priority::from_name("verbose"), None);
    }

    #[test]
    fn lower_value_is_more_urgent() {
        assert!(Priority::Emerg < Priority::Err);
        assert!(Priority::Debug > Priority::Info);
    }

    #[test]
    fn facility_lookup() {
        assert_eq!(Facility::from_name("local7"), Some(Facility::Local7));
        assert_eq!(Facility::Local7.code(), 23);
        assert_eq!(Facility::AuthPriv.name(), "AUTHPRIV");
        assert_eq!(Facility::from_name("nope"), None);
    }
}
