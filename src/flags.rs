use std::fmt::{Display, Formatter};

bitflags::bitflags! {
    /// Underlying change sources a backend may report as a modification.
    ///
    /// Bit values follow the `FSEvents` item flags they originate from, so the set can be handed
    /// to the macOS backend unchanged.
    pub struct ModifiedSources: u32 {
        const INODE_META = 0x0000_0400;
        const CONTENT = 0x0000_1000;
        const FINDER_INFO = 0x0000_2000;
        const OWNER = 0x0000_4000;
        const XATTR = 0x0000_8000;
    }
}

bitflags::bitflags! {
    /// `FILE_NOTIFY_CHANGE_*` filter for `ReadDirectoryChangesW`.
    pub struct NotifyFilter: u32 {
        const FILE_NAME = 0x0000_0001;
        const DIR_NAME = 0x0000_0002;
        const ATTRIBUTES = 0x0000_0004;
        const SIZE = 0x0000_0008;
        const LAST_WRITE = 0x0000_0010;
        const LAST_ACCESS = 0x0000_0020;
        const CREATION = 0x0000_0040;
        const SECURITY = 0x0000_0100;
    }
}

impl NotifyFilter {
    /// The modification sources still observable under this filter.
    pub fn modified_sources(self) -> ModifiedSources {
        let mut sources = ModifiedSources::all();
        if !self.intersects(Self::SIZE | Self::LAST_WRITE) {
            sources.remove(ModifiedSources::CONTENT);
        }
        if !self.intersects(Self::ATTRIBUTES | Self::CREATION | Self::LAST_ACCESS) {
            sources.remove(ModifiedSources::INODE_META | ModifiedSources::FINDER_INFO);
        }
        if !self.contains(Self::SECURITY) {
            sources.remove(ModifiedSources::OWNER);
        }
        if !self.contains(Self::ATTRIBUTES) {
            sources.remove(ModifiedSources::XATTR);
        }
        sources
    }
}

impl Display for ModifiedSources {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.contains(Self::INODE_META) {
            let _d = write!(f, "INODE_META ");
        }
        if self.contains(Self::CONTENT) {
            let _d = write!(f, "CONTENT ");
        }
        if self.contains(Self::FINDER_INFO) {
            let _d = write!(f, "FINDER_INFO ");
        }
        if self.contains(Self::OWNER) {
            let _d = write!(f, "OWNER ");
        }
        if self.contains(Self::XATTR) {
            let _d = write!(f, "XATTR ");
        }
        write!(f, "")
    }
}

impl Display for NotifyFilter {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.contains(Self::FILE_NAME) {
            let _d = write!(f, "FILE_NAME ");
        }
        if self.contains(Self::DIR_NAME) {
            let _d = write!(f, "DIR_NAME ");
        }
        if self.contains(Self::ATTRIBUTES) {
            let _d = write!(f, "ATTRIBUTES ");
        }
        if self.contains(Self::SIZE) {
            let _d = write!(f, "SIZE ");
        }
        if self.contains(Self::LAST_WRITE) {
            let _d = write!(f, "LAST_WRITE ");
        }
        if self.contains(Self::LAST_ACCESS) {
            let _d = write!(f, "LAST_ACCESS ");
        }
        if self.contains(Self::CREATION) {
            let _d = write!(f, "CREATION ");
        }
        if self.contains(Self::SECURITY) {
            let _d = write!(f, "SECURITY ");
        }
        write!(f, "")
    }
}
