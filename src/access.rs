//! Access modes shared by mapping objects and the views created from them.

use crate::errors::MmapViewError;

/// Access mode of a mapping object or of a single view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MmapAccess {
    /// Read-only access.
    Read,
    /// Write access. Only meaningful for views; a mapping object cannot be write-only.
    Write,
    /// Read-write access.
    ReadWrite,
    /// Copy-on-Write (private). Writes stay in this view; the backing object is unchanged.
    CopyOnWrite,
    /// Read access with execute permission.
    ReadExecute,
    /// Read-write access with execute permission.
    ReadWriteExecute,
}

impl MmapAccess {
    /// Whether bytes can be read through a view with this access.
    #[must_use]
    pub fn can_read(self) -> bool {
        !matches!(self, Self::Write)
    }

    /// Whether bytes can be written through a view with this access.
    ///
    /// Copy-on-write and read-write-execute count as writable.
    #[must_use]
    pub fn can_write(self) -> bool {
        matches!(
            self,
            Self::Write | Self::ReadWrite | Self::CopyOnWrite | Self::ReadWriteExecute
        )
    }

    /// Whether the mapped pages are executable.
    #[must_use]
    pub fn is_executable(self) -> bool {
        matches!(self, Self::ReadExecute | Self::ReadWriteExecute)
    }

    /// Whether a mapping object opened with `self` can hand out a view with `view`.
    #[must_use]
    pub fn permits(self, view: MmapAccess) -> bool {
        use MmapAccess::*;
        match self {
            Read | CopyOnWrite => matches!(view, Read | CopyOnWrite),
            ReadWrite => matches!(view, Read | Write | ReadWrite | CopyOnWrite),
            ReadExecute => matches!(view, Read | CopyOnWrite | ReadExecute),
            ReadWriteExecute => true,
            Write => view == Write,
        }
    }
}

impl TryFrom<u32> for MmapAccess {
    type Error = MmapViewError;

    /// Decode the stable numeric encoding (ReadWrite = 0 through ReadWriteExecute = 5).
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ReadWrite),
            1 => Ok(Self::Read),
            2 => Ok(Self::Write),
            3 => Ok(Self::CopyOnWrite),
            4 => Ok(Self::ReadExecute),
            5 => Ok(Self::ReadWriteExecute),
            _ => Err(MmapViewError::InvalidAccess("unknown access value")),
        }
    }
}

impl From<MmapAccess> for u32 {
    fn from(access: MmapAccess) -> Self {
        match access {
            MmapAccess::ReadWrite => 0,
            MmapAccess::Read => 1,
            MmapAccess::Write => 2,
            MmapAccess::CopyOnWrite => 3,
            MmapAccess::ReadExecute => 4,
            MmapAccess::ReadWriteExecute => 5,
        }
    }
}
