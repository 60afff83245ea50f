use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;

/// Ordered list of target hosts.
///
/// An empty list means localhost only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hostfile {
    pub path: Option<Utf8PathBuf>,
    pub hosts: Vec<String>,
}

impl Hostfile {
    pub fn localhost() -> Self {
        Self::default()
    }

    pub fn from_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: None,
            hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }

    /// Read a hostfile: one host per line, `#` comments, `node[01-04]` ranges.
    pub fn load(path: &Utf8Path) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            hosts: parse_hosts(&contents),
        })
    }

    pub fn is_local(&self) -> bool {
        self.hosts
            .iter()
            .all(|h| matches!(h.as_str(), "localhost" | "127.0.0.1"))
    }

    /// Hosts to run on; `["localhost"]` when empty.
    pub fn targets(&self) -> Vec<String> {
        if self.hosts.is_empty() {
            vec!["localhost".to_string()]
        } else {
            self.hosts.clone()
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

pub fn parse_hosts(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .flat_map(expand_range)
        .collect()
}

fn expand_range(line: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (line.find('['), line.rfind(']')) else {
        return vec![line.to_string()];
    };
    if close < open {
        return vec![line.to_string()];
    }
    let prefix = &line[..open];
    let suffix = &line[close + 1..];
    let mut out = Vec::new();
    for part in line[open + 1..close].split(',') {
        let part = part.trim();
        match part.split_once('-') {
            Some((lo, hi)) => {
                let width = lo.len();
                match (lo.parse::<u64>(), hi.parse::<u64>()) {
                    (Ok(a), Ok(b)) if a <= b => {
                        for n in a..=b {
                            out.push(format!("{prefix}{n:0width$}{suffix}"));
                        }
                    }
                    _ => out.push(format!("{prefix}{part}{suffix}")),
                }
            }
            None => out.push(format!("{prefix}{part}{suffix}")),
        }
    }
    out
}
