//! Host systems and external file attributes.
//!
//! The high byte of a central header's "version made by" field names the
//! host system that wrote the entry. The meaning of the 32-bit external
//! attribute word depends on that host: MS-DOS attribute bits in the low
//! byte, and for Unix-like hosts a POSIX mode in the high 16 bits.

/// MS-DOS read-only attribute.
pub const DOS_READ_ONLY: u32 = 0x01;

/// MS-DOS directory attribute.
pub const DOS_DIRECTORY: u32 = 0x10;

/// MS-DOS archive attribute.
pub const DOS_ARCHIVE: u32 = 0x20;

/// POSIX file type mask.
const S_IFMT: u32 = 0o170000;

/// POSIX directory type.
const S_IFDIR: u32 = 0o040000;

/// POSIX regular file type.
const S_IFREG: u32 = 0o100000;

/// POSIX symbolic link type.
const S_IFLNK: u32 = 0o120000;

/// Host system recorded in the "version made by" field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    /// MS-DOS and OS/2 FAT.
    Dos,
    /// Amiga.
    Amiga,
    /// OpenVMS.
    OpenVms,
    /// Unix.
    Unix,
    /// VM/CMS.
    VmCms,
    /// Atari ST.
    Atari,
    /// OS/2 HPFS.
    Os2,
    /// Classic Macintosh.
    Macintosh,
    /// Z-System.
    ZSystem,
    /// CP/M.
    Cpm,
    /// Windows NTFS.
    Ntfs,
    /// MVS (OS/390, z/OS).
    Mvs,
    /// VSE.
    Vse,
    /// Acorn RISC OS.
    Acorn,
    /// Windows VFAT.
    Vfat,
    /// Alternate MVS.
    AltMvs,
    /// BeOS.
    BeOs,
    /// Tandem.
    Tandem,
    /// OS/400.
    Os400,
    /// macOS (Darwin).
    Osx,
    /// Any other value.
    Unknown(u8),
}

impl OperatingSystem {
    /// Decodes the high byte of "version made by".
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Dos,
            1 => Self::Amiga,
            2 => Self::OpenVms,
            3 => Self::Unix,
            4 => Self::VmCms,
            5 => Self::Atari,
            6 => Self::Os2,
            7 => Self::Macintosh,
            8 => Self::ZSystem,
            9 => Self::Cpm,
            10 => Self::Ntfs,
            11 => Self::Mvs,
            12 => Self::Vse,
            13 => Self::Acorn,
            14 => Self::Vfat,
            15 => Self::AltMvs,
            16 => Self::BeOs,
            17 => Self::Tandem,
            18 => Self::Os400,
            19 => Self::Osx,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Dos => 0,
            Self::Amiga => 1,
            Self::OpenVms => 2,
            Self::Unix => 3,
            Self::VmCms => 4,
            Self::Atari => 5,
            Self::Os2 => 6,
            Self::Macintosh => 7,
            Self::ZSystem => 8,
            Self::Cpm => 9,
            Self::Ntfs => 10,
            Self::Mvs => 11,
            Self::Vse => 12,
            Self::Acorn => 13,
            Self::Vfat => 14,
            Self::AltMvs => 15,
            Self::BeOs => 16,
            Self::Tandem => 17,
            Self::Os400 => 18,
            Self::Osx => 19,
            Self::Unknown(value) => value,
        }
    }

    /// Returns true if the host stores a POSIX mode in the upper attribute bits.
    pub fn is_unix_like(self) -> bool {
        matches!(self, Self::Unix | Self::Osx | Self::BeOs)
    }

    /// Host value written for new entries on this platform.
    pub fn current() -> Self {
        if cfg!(windows) { Self::Dos } else { Self::Unix }
    }
}

/// The host system plus the raw 32-bit external attribute word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalAttributes {
    /// Host system that defines the meaning of `attributes`.
    pub os: OperatingSystem,
    /// The raw attribute word.
    pub attributes: u32,
}

impl ExternalAttributes {
    /// Creates attributes from their parts.
    pub fn new(os: OperatingSystem, attributes: u32) -> Self {
        Self { os, attributes }
    }

    /// Unix attributes carrying `mode` in the upper 16 bits.
    ///
    /// The MS-DOS directory bit mirrors `S_IFDIR` so that DOS-only readers
    /// still see directories.
    pub fn from_unix_mode(mode: u32) -> Self {
        let mode = mode & 0xFFFF;
        let mut attributes = mode << 16;
        if mode & S_IFMT == S_IFDIR {
            attributes |= DOS_DIRECTORY;
        }
        if mode & 0o222 == 0 {
            attributes |= DOS_READ_ONLY;
        }
        Self::new(OperatingSystem::Unix, attributes)
    }

    /// Default attributes for a new regular file.
    pub fn default_file() -> Self {
        Self::from_unix_mode(S_IFREG | 0o644)
    }

    /// Default attributes for a new directory.
    pub fn default_directory() -> Self {
        Self::from_unix_mode(S_IFDIR | 0o755)
    }

    /// POSIX mode from the upper 16 bits, for Unix-like hosts.
    pub fn unix_mode(&self) -> Option<u32> {
        let mode = self.attributes >> 16;
        (self.os.is_unix_like() && mode != 0).then_some(mode)
    }

    /// Returns true if the attributes mark a directory.
    pub fn is_directory(&self) -> bool {
        if self.attributes & DOS_DIRECTORY != 0 {
            return true;
        }
        self.unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFDIR)
    }

    /// Returns true if the attributes mark a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.unix_mode()
            .is_some_and(|mode| mode & S_IFMT == S_IFLNK)
    }

    /// Returns true if the MS-DOS read-only bit is set.
    pub fn is_read_only(&self) -> bool {
        self.attributes & DOS_READ_ONLY != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_round_trip() {
        for value in 0..=255u8 {
            assert_eq!(OperatingSystem::from_u8(value).as_u8(), value);
        }
        assert_eq!(OperatingSystem::from_u8(3), OperatingSystem::Unix);
        assert_eq!(OperatingSystem::from_u8(42), OperatingSystem::Unknown(42));
    }

    #[test]
    fn test_unix_mode() {
        let attrs = ExternalAttributes::from_unix_mode(0o100755);
        assert_eq!(attrs.unix_mode(), Some(0o100755));
        assert!(!attrs.is_directory());
        assert_eq!(attrs.attributes, 0o100755 << 16);
    }

    #[test]
    fn test_directory_detection() {
        assert!(ExternalAttributes::default_directory().is_directory());
        assert!(ExternalAttributes::new(OperatingSystem::Dos, DOS_DIRECTORY).is_directory());
        assert!(!ExternalAttributes::new(OperatingSystem::Dos, DOS_ARCHIVE).is_directory());
    }

    #[test]
    fn test_dos_host_has_no_unix_mode() {
        let attrs = ExternalAttributes::new(OperatingSystem::Dos, 0o100644 << 16);
        assert_eq!(attrs.unix_mode(), None);
    }

    #[test]
    fn test_symlink_and_read_only() {
        let link = ExternalAttributes::from_unix_mode(S_IFLNK | 0o777);
        assert!(link.is_symlink());
        assert!(!link.is_read_only());

        let ro = ExternalAttributes::from_unix_mode(S_IFREG | 0o444);
        assert!(ro.is_read_only());
    }
}
