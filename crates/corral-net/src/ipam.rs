//! Bitmap IP address management.
//!
//! The allocation table maps a canonical subnet (`192.168.10.0/24`) to a
//! bitmap string with one character per address of the subnet, `'0'` free
//! and `'1'` taken. Index `i` stands for the address `base + i + 1`, so
//! index 0 yields `.1`. The two top indices would land on the broadcast
//! address and past the subnet; they are never handed out.
//!
//! Every read-modify-write of the table runs under an exclusive `flock`
//! on `<table>.lock`, so concurrent `corral` invocations cannot lose
//! each other's updates.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use corral_common::error::{CorralError, Result};
use ipnetwork::Ipv4Network;
use nix::fcntl::{Flock, FlockArg};

/// Smallest accepted prefix length.
pub const MIN_PREFIX: u8 = 8;
/// Largest accepted prefix length.
pub const MAX_PREFIX: u8 = 30;

type Table = BTreeMap<String, String>;

/// Address allocator backed by a JSON file.
#[derive(Debug, Clone)]
pub struct Ipam {
    allocator_path: PathBuf,
}

impl Ipam {
    /// Creates an allocator persisting to `allocator_path`.
    #[must_use]
    pub fn new(allocator_path: impl Into<PathBuf>) -> Self {
        Self {
            allocator_path: allocator_path.into(),
        }
    }

    /// Location of the allocation table.
    #[must_use]
    pub fn allocator_path(&self) -> &Path {
        &self.allocator_path
    }

    /// Takes the lowest free address of `subnet`.
    ///
    /// The table is written back even when the subnet is exhausted, so a
    /// first allocation always leaves the subnet's bitmap on disk.
    ///
    /// # Errors
    ///
    /// Returns [`CorralError::Exhausted`] when no address is free, a
    /// config error for an unsupported prefix, or a persistence error.
    pub fn allocate(&self, subnet: &Ipv4Network) -> Result<Ipv4Addr> {
        let subnet = canonical(subnet)?;
        let key = subnet.to_string();
        let len = bitmap_len(&subnet);

        let _lock = self.lock()?;
        let mut table = self.load()?;
        let bitmap = table.entry(key.clone()).or_insert_with(|| "0".repeat(len));

        let allocated = match first_free(bitmap, usable_len(len)) {
            Some(index) => {
                bitmap.replace_range(index..=index, "1");
                Ok(address_at(&subnet, index))
            }
            None => Err(CorralError::Exhausted { subnet: key }),
        };
        self.dump(&table)?;

        let ip = allocated?;
        tracing::debug!(subnet = %subnet, ip = %ip, "address allocated");
        Ok(ip)
    }

    /// Returns `ip` to the free pool of `subnet`.
    ///
    /// # Errors
    ///
    /// Returns an error if `ip` is not an allocatable address of `subnet`,
    /// the subnet has no table entry, or persistence fails.
    pub fn release(&self, subnet: &Ipv4Network, ip: Ipv4Addr) -> Result<()> {
        let subnet = canonical(subnet)?;
        let key = subnet.to_string();
        let index = index_of(&subnet, ip).ok_or_else(|| CorralError::Config {
            message: format!("{ip} is not an allocatable address of {key}"),
        })?;

        let _lock = self.lock()?;
        let mut table = self.load()?;
        let bitmap = table.get_mut(&key).ok_or_else(|| CorralError::NotFound {
            kind: "subnet allocation",
            id: key.clone(),
        })?;
        if index < bitmap.len() {
            bitmap.replace_range(index..=index, "0");
        }
        self.dump(&table)?;

        tracing::debug!(subnet = %subnet, ip = %ip, "address released");
        Ok(())
    }

    fn lock(&self) -> Result<Flock<File>> {
        ensure_parent(&self.allocator_path)?;
        let mut lock_path = self.allocator_path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| CorralError::Io {
                path: lock_path.clone(),
                source: e,
            })?;
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| CorralError::Syscall {
            message: format!("flock {} failed: {errno}", lock_path.display()),
        })
    }

    fn load(&self) -> Result<Table> {
        match std::fs::read_to_string(&self.allocator_path) {
            Ok(content) if content.trim().is_empty() => Ok(Table::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.allocator_path.display(), "no allocation table yet");
                Ok(Table::new())
            }
            Err(e) => Err(CorralError::Io {
                path: self.allocator_path.clone(),
                source: e,
            }),
        }
    }

    fn dump(&self, table: &Table) -> Result<()> {
        ensure_parent(&self.allocator_path)?;
        let json = serde_json::to_string(table)?;
        std::fs::write(&self.allocator_path, json).map_err(|e| CorralError::Io {
            path: self.allocator_path.clone(),
            source: e,
        })
    }
}

fn canonical(subnet: &Ipv4Network) -> Result<Ipv4Network> {
    let prefix = subnet.prefix();
    if !(MIN_PREFIX..=MAX_PREFIX).contains(&prefix) {
        return Err(CorralError::Config {
            message: format!("subnet {subnet} must have a prefix between /{MIN_PREFIX} and /{MAX_PREFIX}"),
        });
    }
    Ipv4Network::new(subnet.network(), prefix).map_err(|e| CorralError::Config {
        message: format!("invalid subnet {subnet}: {e}"),
    })
}

/// One bitmap slot per address of the subnet.
fn bitmap_len(subnet: &Ipv4Network) -> usize {
    1usize << (32 - u32::from(subnet.prefix()))
}

/// Slots whose address is neither the broadcast address nor outside the subnet.
const fn usable_len(len: usize) -> usize {
    len.saturating_sub(2)
}

fn first_free(bitmap: &str, usable: usize) -> Option<usize> {
    bitmap.bytes().take(usable).position(|b| b == b'0')
}

fn address_at(subnet: &Ipv4Network, index: usize) -> Ipv4Addr {
    let offset = u32::try_from(index).unwrap_or(u32::MAX);
    Ipv4Addr::from(u32::from(subnet.network()).saturating_add(offset).saturating_add(1))
}

fn index_of(subnet: &Ipv4Network, ip: Ipv4Addr) -> Option<usize> {
    let offset = u32::from(ip).checked_sub(u32::from(subnet.network()))?.checked_sub(1)?;
    let index = usize::try_from(offset).ok()?;
    (index < usable_len(bitmap_len(subnet))).then_some(index)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CorralError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipam(dir: &Path) -> Ipam {
        Ipam::new(dir.join("ipam/subnet.json"))
    }

    fn net(s: &str) -> Ipv4Network {
        s.parse().unwrap()
    }

    fn table(ipam: &Ipam) -> Table {
        serde_json::from_str(&std::fs::read_to_string(ipam.allocator_path()).unwrap()).unwrap()
    }

    #[test]
    fn fresh_slash24_allocates_increasing_from_dot_one() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("192.168.0.0/24");

        let ips: Vec<Ipv4Addr> = (0..5).map(|_| ipam.allocate(&subnet).unwrap()).collect();
        assert_eq!(ips[0], Ipv4Addr::new(192, 168, 0, 1));
        assert!(ips.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ips[4], Ipv4Addr::new(192, 168, 0, 5));
    }

    #[test]
    fn table_is_keyed_by_canonical_subnet() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let _ = ipam.allocate(&net("10.20.0.7/24")).unwrap();

        let table = table(&ipam);
        let bitmap = &table["10.20.0.0/24"];
        assert_eq!(bitmap.len(), 256);
        assert!(bitmap.starts_with("10"));
    }

    #[test]
    fn allocate_then_release_restores_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("172.16.5.0/24");
        let _ = ipam.allocate(&subnet).unwrap();
        let before = table(&ipam);

        let ip = ipam.allocate(&subnet).unwrap();
        ipam.release(&subnet, ip).unwrap();
        assert_eq!(table(&ipam), before);
    }

    #[test]
    fn released_address_is_reused_first() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("192.168.1.0/24");
        let first = ipam.allocate(&subnet).unwrap();
        let _second = ipam.allocate(&subnet).unwrap();

        ipam.release(&subnet, first).unwrap();
        assert_eq!(ipam.allocate(&subnet).unwrap(), first);
    }

    #[test]
    fn offsets_carry_across_octets() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("10.0.0.0/16");
        let mut bitmap = "1".repeat(300);
        bitmap.push_str(&"0".repeat(65536 - 300));
        let mut t = Table::new();
        let _ = t.insert("10.0.0.0/16".into(), bitmap);
        std::fs::create_dir_all(ipam.allocator_path().parent().unwrap()).unwrap();
        std::fs::write(ipam.allocator_path(), serde_json::to_string(&t).unwrap()).unwrap();

        assert_eq!(ipam.allocate(&subnet).unwrap(), Ipv4Addr::new(10, 0, 1, 45));
    }

    #[test]
    fn wide_subnet_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("172.16.0.0/12");

        let first = ipam.allocate(&subnet).unwrap();
        let second = ipam.allocate(&subnet).unwrap();
        assert_eq!(first, Ipv4Addr::new(172, 16, 0, 1));
        assert_eq!(second, Ipv4Addr::new(172, 16, 0, 2));
        assert_eq!(table(&ipam)["172.16.0.0/12"].len(), 1 << 20);

        ipam.release(&subnet, first).unwrap();
        assert_eq!(ipam.allocate(&subnet).unwrap(), first);
    }

    #[test]
    fn exhausted_subnet_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("192.168.2.0/30");

        assert_eq!(ipam.allocate(&subnet).unwrap(), Ipv4Addr::new(192, 168, 2, 1));
        assert_eq!(ipam.allocate(&subnet).unwrap(), Ipv4Addr::new(192, 168, 2, 2));
        let err = ipam.allocate(&subnet).unwrap_err();
        assert!(matches!(err, CorralError::Exhausted { ref subnet } if subnet == "192.168.2.0/30"));
    }

    #[test]
    fn full_bitmap_never_yields_base_address() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let mut t = Table::new();
        let _ = t.insert("192.168.3.0/24".into(), "1".repeat(256));
        std::fs::create_dir_all(ipam.allocator_path().parent().unwrap()).unwrap();
        std::fs::write(ipam.allocator_path(), serde_json::to_string(&t).unwrap()).unwrap();

        assert!(ipam.allocate(&net("192.168.3.0/24")).is_err());
        assert_eq!(table(&ipam)["192.168.3.0/24"], "1".repeat(256));
    }

    #[test]
    fn unsupported_prefixes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        for cidr in ["10.0.0.0/7", "10.0.0.0/31", "10.0.0.0/32"] {
            assert!(matches!(
                ipam.allocate(&net(cidr)),
                Err(CorralError::Config { .. })
            ));
        }
    }

    #[test]
    fn release_outside_subnet_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ipam = ipam(dir.path());
        let subnet = net("192.168.4.0/24");
        let _ = ipam.allocate(&subnet).unwrap();

        for ip in [
            Ipv4Addr::new(192, 168, 4, 0),
            Ipv4Addr::new(192, 168, 4, 255),
            Ipv4Addr::new(10, 0, 0, 1),
        ] {
            assert!(ipam.release(&subnet, ip).is_err(), "{ip}");
        }
    }

    #[test]
    fn release_of_unknown_subnet_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ipam(dir.path())
            .release(&net("192.168.9.0/24"), Ipv4Addr::new(192, 168, 9, 1))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
