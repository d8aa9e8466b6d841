use std::io;
use std::path::{Path, PathBuf};

use bitflags::bitflags;
use time::macros::format_description;
use time::OffsetDateTime;

bitflags! {
    /// The WebDAV verbs a checkout uses.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DavMethod: u32 {
        const HEAD = 0x0001;
        const GET = 0x0002;
        const PUT = 0x0004;
        const LOCK = 0x0008;
        const UNLOCK = 0x0010;

        const READ = Self::HEAD.bits() | Self::GET.bits();
        const LOCKING = Self::LOCK.bits() | Self::UNLOCK.bits();
    }
}

impl DavMethod {
    /// The method name as it goes on the wire.
    pub fn as_str(&self) -> &'static str {
        const NAMES: [(DavMethod, &str); 5] = [
            (DavMethod::HEAD, "HEAD"),
            (DavMethod::GET, "GET"),
            (DavMethod::PUT, "PUT"),
            (DavMethod::LOCK, "LOCK"),
            (DavMethod::UNLOCK, "UNLOCK"),
        ];
        NAMES
            .iter()
            .find(|(m, _)| m == self)
            .map(|(_, name)| *name)
            .unwrap_or("")
    }

    /// Translate into a `http::Method`. Only single methods translate.
    pub fn to_http(&self) -> Option<http::Method> {
        if *self == DavMethod::HEAD {
            Some(http::Method::HEAD)
        } else if *self == DavMethod::GET {
            Some(http::Method::GET)
        } else if *self == DavMethod::PUT {
            Some(http::Method::PUT)
        } else if *self == DavMethod::LOCK || *self == DavMethod::UNLOCK {
            http::Method::from_bytes(self.as_str().as_bytes()).ok()
        } else {
            None
        }
    }
}

/// Name for a fresh working directory: prefix plus a UTC timestamp
/// down to the nanosecond.
pub(crate) fn working_dir_name(prefix: &str, now: OffsetDateTime) -> String {
    let fmt = format_description!("[year][month][day]T[hour][minute][second][subsecond digits:9]");
    // formatting a valid OffsetDateTime with this description cannot fail.
    let stamp = now
        .format(&fmt)
        .unwrap_or_else(|_| now.unix_timestamp_nanos().to_string());
    format!("{prefix}{stamp}")
}

/// Create a uniquely named directory below `root`.
///
/// Two checkouts started within the same nanosecond get a random suffix
/// instead of sharing a directory.
pub(crate) async fn create_working_dir(root: &Path, prefix: &str) -> io::Result<PathBuf> {
    let name = working_dir_name(prefix, OffsetDateTime::now_utc());
    let path = root.join(&name);
    match make_dir(&path).await {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            let path = root.join(format!("{}-{}", name, uuid::Uuid::new_v4().simple()));
            make_dir(&path).await?;
            Ok(path)
        }
        Err(e) => Err(e),
        Ok(()) => Ok(path),
    }
}

async fn make_dir(path: &Path) -> io::Result<()> {
    #[allow(unused_mut)]
    let mut dir = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    dir.mode(0o700);
    dir.create(path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_working_dir_name() {
        let t = datetime!(2009-03-01 12:30:05.000000042 UTC);
        assert_eq!(working_dir_name("silver-", t), "silver-20090301T123005000000042");
    }

    #[test]
    fn test_method_mapping() {
        for m in [
            DavMethod::HEAD,
            DavMethod::GET,
            DavMethod::PUT,
            DavMethod::LOCK,
            DavMethod::UNLOCK,
        ] {
            let http = m.to_http().unwrap();
            assert_eq!(http.as_str(), m.as_str());
        }
        assert!(DavMethod::READ.to_http().is_none());
    }

    #[tokio::test]
    async fn test_create_working_dir_unique() {
        let root = std::env::temp_dir();
        let a = create_working_dir(&root, "davco-test-").await.unwrap();
        let b = create_working_dir(&root, "davco-test-").await.unwrap();
        assert_ne!(a, b);
        assert!(a.is_dir() && b.is_dir());
        std::fs::remove_dir(a).unwrap();
        std::fs::remove_dir(b).unwrap();
    }
}
