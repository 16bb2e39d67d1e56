// src/readers/windowedsource.rs

//! Implements [`WindowedByteSource`], the driver of reading bytes from a
//! file through a small window of resident pages.
//!
//! [`WindowedByteSource`]: crate::readers::windowedsource::WindowedByteSource

use crate::common::{Count, FileOffset, FileSz, ProcessResult, CRu8, NLu8};
use crate::data::line::Line;

use std::cmp::min;
use std::fmt;
use std::io::{Error, ErrorKind, Read, Result, Seek, SeekFrom};
use std::ops::ControlFlow;

use ::memchr::{memchr, memrchr};
#[allow(unused_imports)]
use ::more_asserts::{debug_assert_ge, debug_assert_le, debug_assert_lt};
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Index of a page, `file offset >> page_bits`.
pub type PageIndex = u64;

/// Default page size as a power of two, 64 KiB pages.
pub const PAGE_SIZE_BITS_DEFAULT: u32 = 16;

/// Smallest allowed page size as a power of two (inclusive).
pub const PAGE_SIZE_BITS_MIN: u32 = 8;

/// Largest allowed page size as a power of two (inclusive).
pub const PAGE_SIZE_BITS_MAX: u32 = 24;

/// Return value of the consumers passed to [`WindowedByteSource::search`]
/// and [`WindowedByteSource::search_back`].
pub type SearchFlow = ControlFlow<()>;

/// Random access to a file of known size through at most two adjacent
/// resident pages.
///
/// The page buffer is allocated once and reused:
/// * reading within the resident pages does no I/O.
/// * moving forward by exactly one page reads only the new page.
/// * anything else reloads the window.
///
/// The size is pinned at construction; a file that shrinks afterwards
/// results in [`ErrorKind::UnexpectedEof`] from the reads that run past
/// its new end.
///
/// Slices returned by [`read`] and handed to search consumers borrow the
/// page buffer and are invalid after the next call.
///
/// [`read`]: WindowedByteSource::read
pub struct WindowedByteSource<R> {
    reader: R,
    size: FileSz,
    page_bits: u32,
    /// room for two pages
    buffer: Vec<u8>,
    /// page index of the first resident page
    loaded_page: PageIndex,
    /// count of resident pages, `0`, `1`, or `2`
    loaded_count: u8,
    /// `Count` of page reads from the underlying reader.
    pub(crate) count_page_reads: Count,
    /// `Count` of page requests served from resident pages.
    pub(crate) count_page_hits: Count,
}

impl<R> fmt::Debug for WindowedByteSource<R> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("WindowedByteSource")
            .field("size", &self.size)
            .field("page_bits", &self.page_bits)
            .field("loaded_page", &self.loaded_page)
            .field("loaded_count", &self.loaded_count)
            .field("count_page_reads", &self.count_page_reads)
            .field("count_page_hits", &self.count_page_hits)
            .finish()
    }
}

fn error_eof(
    pos: FileOffset,
    len: u64,
    size: FileSz,
) -> Error {
    Error::new(
        ErrorKind::UnexpectedEof,
        format!("read of {} bytes at {} is past end of file size {}", len, pos, size),
    )
}

impl<R: Read + Seek> WindowedByteSource<R> {
    /// Create a `WindowedByteSource` over `reader` that holds `size` bytes,
    /// with pages of `1 << page_bits` bytes.
    pub fn new(
        reader: R,
        size: FileSz,
        page_bits: u32,
    ) -> WindowedByteSource<R> {
        defñ!("(size {}, page_bits {})", size, page_bits);
        assert!(
            (PAGE_SIZE_BITS_MIN..=PAGE_SIZE_BITS_MAX).contains(&page_bits),
            "page_bits {} out of range",
            page_bits
        );
        WindowedByteSource {
            reader,
            size,
            page_bits,
            buffer: vec![0; 2 << page_bits],
            loaded_page: 0,
            loaded_count: 0,
            count_page_reads: 0,
            count_page_hits: 0,
        }
    }

    /// File size pinned at construction.
    #[inline(always)]
    pub const fn size(&self) -> FileSz {
        self.size
    }

    /// Page size in bytes; the largest length accepted by [`read`].
    ///
    /// [`read`]: WindowedByteSource::read
    #[inline(always)]
    pub const fn page_size(&self) -> u64 {
        1 << self.page_bits
    }

    /// Give back the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read `len` bytes at file offset `pos` into the page buffer at
    /// `at`.
    fn fill(
        &mut self,
        pos: FileOffset,
        at: usize,
        len: usize,
    ) -> Result<()> {
        defo!("fill(pos {}, at {}, len {})", pos, at, len);
        self.reader.seek(SeekFrom::Start(pos))?;
        self.reader.read_exact(&mut self.buffer[at..at + len])?;
        self.count_page_reads += 1;

        Ok(())
    }

    /// Make page `page` resident.
    fn load_one_page(
        &mut self,
        page: PageIndex,
    ) -> Result<()> {
        match self.loaded_count {
            1 if self.loaded_page == page => {
                self.count_page_hits += 1;
                return Ok(());
            }
            1 if self.loaded_page + 1 == page => {
                return self.load_second_page();
            }
            2 if self.loaded_page == page || self.loaded_page + 1 == page => {
                self.count_page_hits += 1;
                return Ok(());
            }
            _ => {}
        }
        let pos: FileOffset = page << self.page_bits;
        debug_assert_lt!(pos, self.size);
        let len = min(self.size - pos, self.page_size()) as usize;
        // a failed read leaves nothing resident
        self.loaded_count = 0;
        self.fill(pos, 0, len)?;
        self.loaded_page = page;
        self.loaded_count = 1;

        Ok(())
    }

    /// Make pages `page` and `page + 1` resident.
    fn load_two_pages(
        &mut self,
        page: PageIndex,
    ) -> Result<()> {
        let pos: FileOffset = page << self.page_bits;
        let len = min(self.size - pos, self.page_size() * 2) as usize;
        debug_assert_lt!(self.page_size() as usize, len);
        self.loaded_count = 0;
        self.fill(pos, 0, len)?;
        self.loaded_page = page;
        self.loaded_count = 2;

        Ok(())
    }

    /// Read the page after the one resident page.
    fn load_second_page(&mut self) -> Result<()> {
        debug_assert_eq!(self.loaded_count, 1);
        let pos: FileOffset = (self.loaded_page + 1) << self.page_bits;
        let len = min(self.size - pos, self.page_size()) as usize;
        let at = self.page_size() as usize;
        self.loaded_count = 0;
        self.fill(pos, at, len)?;
        self.loaded_count = 2;

        Ok(())
    }

    /// File offset one past the resident window.
    #[inline(always)]
    fn window_end(&self) -> FileOffset {
        min(
            (self.loaded_page << self.page_bits) + self.page_size() * self.loaded_count as u64,
            self.size,
        )
    }

    /// Scan forward from `pos`.
    ///
    /// `consumer` is handed the largest resident span of bytes starting at
    /// the current offset, and that offset, until it returns
    /// `ControlFlow::Break` ([`ProcessResult::Stopped`]) or the end of the
    /// file is reached ([`ProcessResult::Exhausted`]).
    ///
    /// `pos == size` hands nothing to the consumer.
    pub fn search<F>(
        &mut self,
        pos: FileOffset,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(&[u8], FileOffset) -> SearchFlow,
    {
        defn!("({})", pos);
        if pos > self.size {
            defx!("({}) past size {}", pos, self.size);
            return Err(error_eof(pos, 0, self.size));
        }
        let mut pos = pos;
        while pos < self.size {
            self.load_one_page(pos >> self.page_bits)?;
            let win_offset: FileOffset = self.loaded_page << self.page_bits;
            let win_end: FileOffset = self.window_end();
            debug_assert!(win_offset <= pos && pos < win_end);
            let span = &self.buffer[(pos - win_offset) as usize..(win_end - win_offset) as usize];
            if consumer(span, pos).is_break() {
                defx!("({}) stopped at {}", pos, pos);
                return Ok(ProcessResult::Stopped);
            }
            pos = win_end;
        }
        defx!("exhausted");

        Ok(ProcessResult::Exhausted)
    }

    /// Scan backward from `pos` toward the start of the file.
    ///
    /// `consumer` is handed the largest resident span of bytes ending at
    /// the current offset, and the file offset of the span's first byte.
    ///
    /// `pos == 0` hands nothing to the consumer.
    pub fn search_back<F>(
        &mut self,
        pos: FileOffset,
        mut consumer: F,
    ) -> Result<ProcessResult>
    where
        F: FnMut(&[u8], FileOffset) -> SearchFlow,
    {
        defn!("({})", pos);
        if pos > self.size {
            defx!("({}) past size {}", pos, self.size);
            return Err(error_eof(pos, 0, self.size));
        }
        let mut pos = pos;
        while pos > 0 {
            self.load_one_page((pos - 1) >> self.page_bits)?;
            let win_offset: FileOffset = self.loaded_page << self.page_bits;
            debug_assert!(win_offset < pos && pos <= self.window_end());
            let span = &self.buffer[..(pos - win_offset) as usize];
            if consumer(span, win_offset).is_break() {
                defx!("stopped in span at {}", win_offset);
                return Ok(ProcessResult::Stopped);
            }
            pos = win_offset;
        }
        defx!("exhausted");

        Ok(ProcessResult::Exhausted)
    }

    /// Borrow `len` bytes at file offset `pos`.
    ///
    /// `len` may not exceed the [page size]. Reading past the end of the
    /// file fails with [`ErrorKind::UnexpectedEof`].
    ///
    /// [page size]: WindowedByteSource::page_size
    pub fn read(
        &mut self,
        pos: FileOffset,
        len: usize,
    ) -> Result<&[u8]> {
        if len as u64 > self.page_size() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("read length {} is larger than page size {}", len, self.page_size()),
            ));
        }
        if pos + len as u64 > self.size {
            return Err(error_eof(pos, len as u64, self.size));
        }
        if len == 0 {
            return Ok(&[]);
        }
        let page_start: PageIndex = pos >> self.page_bits;
        let page_end: PageIndex = (pos + len as u64 - 1) >> self.page_bits;
        if page_start == page_end {
            self.load_one_page(page_start)?;
        } else {
            debug_assert_eq!(page_start + 1, page_end);
            match self.loaded_count {
                1 if self.loaded_page == page_start => self.load_second_page()?,
                2 if self.loaded_page == page_start => self.count_page_hits += 1,
                _ => self.load_two_pages(page_start)?,
            }
        }
        let at = (pos - (self.loaded_page << self.page_bits)) as usize;

        Ok(&self.buffer[at..at + len])
    }

    /// Borrow the first bytes of `line`, at most `max_len` bytes.
    pub fn read_line(
        &mut self,
        line: &Line,
        max_len: usize,
    ) -> Result<&[u8]> {
        let len = min(line.len(), max_len as u64) as usize;
        self.read(line.start, len)
    }

    /// Move `end` before one `'\r'` at `end - 1`.
    fn trim_cr(
        &mut self,
        start: FileOffset,
        end: FileOffset,
    ) -> Result<FileOffset> {
        if end > start && self.read(end - 1, 1)?[0] == CRu8 {
            return Ok(end - 1);
        }

        Ok(end)
    }

    /// Find the line after the line that ends at `prev_end`.
    ///
    /// Skips one line terminator (`"\r\n"`, `"\n"`, or `"\r"`) at
    /// `prev_end`. Returns `None` when only line terminators remain, so a
    /// terminator at the end of the file does not make an empty last
    /// line.
    pub fn load_next_line(
        &mut self,
        prev_end: FileOffset,
    ) -> Result<Option<Line>> {
        defn!("({})", prev_end);
        let mut skip_cr = true;
        let mut skip_nl = true;
        let mut line_start: Option<FileOffset> = None;
        let mut newline: Option<FileOffset> = None;
        self.search(prev_end, |span, offset| {
            let mut at: usize = 0;
            if line_start.is_none() {
                if skip_cr {
                    skip_cr = false;
                    if span[at] == CRu8 {
                        at += 1;
                    }
                }
                if at == span.len() {
                    return SearchFlow::Continue(());
                }
                if skip_nl {
                    skip_nl = false;
                    if span[at] == NLu8 {
                        at += 1;
                    }
                }
                if at == span.len() {
                    return SearchFlow::Continue(());
                }
                line_start = Some(offset + at as u64);
            }
            match memchr(NLu8, &span[at..]) {
                Some(i) => {
                    newline = Some(offset + (at + i) as u64);
                    SearchFlow::Break(())
                }
                None => SearchFlow::Continue(()),
            }
        })?;
        let start: FileOffset = match line_start {
            Some(start) => start,
            None => {
                defx!("({}) return None", prev_end);
                return Ok(None);
            }
        };
        let end = newline.unwrap_or(self.size);
        let end = self.trim_cr(start, end)?;
        defx!("({}) return [{}, {})", prev_end, start, end);

        Ok(Some(Line::new(start, end)))
    }

    /// Find the line before the line that starts at `next_start`.
    ///
    /// Strips one line terminator (`"\r\n"`, `"\n"`, or `"\r"`) before
    /// `next_start`. Returns `None` only when `next_start` is `0`.
    /// `next_start` may be the file size, which finds the last line.
    pub fn load_prev_line(
        &mut self,
        next_start: FileOffset,
    ) -> Result<Option<Line>> {
        defn!("({})", next_start);
        if next_start == 0 {
            defx!("return None");
            return Ok(None);
        }
        let mut strip_nl = true;
        let mut strip_cr = true;
        let mut line_end: Option<FileOffset> = None;
        let mut newline: Option<FileOffset> = None;
        self.search_back(next_start, |span, offset| {
            let mut len: usize = span.len();
            if line_end.is_none() {
                if strip_nl {
                    strip_nl = false;
                    if span[len - 1] == NLu8 {
                        len -= 1;
                    }
                }
                if len == 0 {
                    return SearchFlow::Continue(());
                }
                if strip_cr {
                    strip_cr = false;
                    if span[len - 1] == CRu8 {
                        len -= 1;
                    }
                }
                if len == 0 {
                    return SearchFlow::Continue(());
                }
                line_end = Some(offset + len as u64);
            }
            match memrchr(NLu8, &span[..len]) {
                Some(i) => {
                    newline = Some(offset + i as u64);
                    SearchFlow::Break(())
                }
                None => SearchFlow::Continue(()),
            }
        })?;
        let line = match line_end {
            // nothing but a line terminator at the start of the file
            None => Line::new(0, 0),
            Some(end) => Line::new(newline.map_or(0, |nl| nl + 1), end),
        };
        defx!("({}) return {:?}", next_start, line);

        Ok(Some(line))
    }

    /// Find the line that contains file offset `pos`.
    ///
    /// A `pos` at a `'\n'` finds the line terminated by that `'\n'`.
    pub fn load_line(
        &mut self,
        pos: FileOffset,
    ) -> Result<Line> {
        defn!("({})", pos);
        let mut newline: Option<FileOffset> = None;
        self.search(pos, |span, offset| match memchr(NLu8, span) {
            Some(i) => {
                newline = Some(offset + i as u64);
                SearchFlow::Break(())
            }
            None => SearchFlow::Continue(()),
        })?;
        let end = newline.unwrap_or(self.size);
        let mut newline_before: Option<FileOffset> = None;
        self.search_back(pos, |span, offset| match memrchr(NLu8, span) {
            Some(i) => {
                newline_before = Some(offset + i as u64);
                SearchFlow::Break(())
            }
            None => SearchFlow::Continue(()),
        })?;
        let start = newline_before.map_or(0, |nl| nl + 1);
        let end = self.trim_cr(start, end)?;
        defx!("({}) return [{}, {})", pos, start, end);

        Ok(Line::new(start, end))
    }
}
