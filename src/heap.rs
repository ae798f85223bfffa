//! Program heap: a fixed-count arena of uniform cells with an intrusive
//! free list and a mark-sweep collector.
//!
//! Cells never move, so reference words stay stable across collections.
//! A reference word encodes its arena in the top byte: heap references
//! carry a cell index, stack references (BYREF arguments only) carry an
//! operand-stack slot index. Anything else fails validation and surfaces
//! as a segmentation fault at dereference.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};

use crate::ast::FileMode;
use crate::error::{VmError, VmResult};

const REF_KIND_SHIFT: u32 = 56;
const REF_KIND_HEAP: u64 = 0x01;
const REF_KIND_STACK: u64 = 0x02;
const REF_INDEX_MASK: u64 = (1 << REF_KIND_SHIFT) - 1;

/// Reference word for heap cell `index`.
pub fn heap_ref(index: usize) -> u64 {
    (REF_KIND_HEAP << REF_KIND_SHIFT) | index as u64
}

/// Reference word for operand-stack slot `slot`.
pub fn stack_ref(slot: usize) -> u64 {
    (REF_KIND_STACK << REF_KIND_SHIFT) | slot as u64
}

pub fn as_heap_index(word: u64) -> Option<usize> {
    (word >> REF_KIND_SHIFT == REF_KIND_HEAP).then_some((word & REF_INDEX_MASK) as usize)
}

pub fn as_stack_slot(word: u64) -> Option<usize> {
    (word >> REF_KIND_SHIFT == REF_KIND_STACK).then_some((word & REF_INDEX_MASK) as usize)
}

/// An open file stream. Exactly one of `reader`/`writer` is live,
/// matching the declared access mode; both are dropped on close.
#[derive(Debug)]
pub struct FileHandle {
    pub mode: FileMode,
    reader: Option<BufReader<File>>,
    writer: Option<File>,
    /// Sticky end-of-file flag, set by a read that hits end of stream.
    pub at_eof: bool,
}

impl FileHandle {
    fn open(name: &str, mode: FileMode) -> VmResult<FileHandle> {
        let mut handle = FileHandle {
            mode,
            reader: None,
            writer: None,
            at_eof: false,
        };
        match mode {
            FileMode::Read => {
                let file = File::open(name).map_err(|_| VmError::FileOpen)?;
                handle.reader = Some(BufReader::new(file));
            }
            FileMode::Write => {
                handle.writer = Some(File::create(name).map_err(|_| VmError::FileOpen)?);
            }
            FileMode::Append => {
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(name)
                    .map_err(|_| VmError::FileOpen)?;
                handle.writer = Some(file);
            }
        }
        Ok(handle)
    }

    /// Read one line, without its terminator. Returns an empty line and
    /// sets `at_eof` once the stream is exhausted.
    pub fn read_line(&mut self) -> VmResult<Vec<u8>> {
        let reader = self.reader.as_mut().ok_or(VmError::FileRead)?;
        let mut line = Vec::new();
        let n = reader
            .read_until(b'\n', &mut line)
            .map_err(|_| VmError::FileRead)?;
        if n == 0 {
            self.at_eof = true;
            return Ok(line);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        } else {
            // Last line of a file with no trailing newline.
            self.at_eof = true;
        }
        Ok(line)
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> VmResult<()> {
        let writer = self.writer.as_mut().ok_or(VmError::FileWrite)?;
        writer.write_all(bytes).map_err(|_| VmError::FileWrite)
    }

    /// Drop both stream ends, closing the underlying handle now.
    fn close(&mut self) {
        self.reader = None;
        self.writer = None;
    }
}

/// What a heap cell holds.
#[derive(Debug, Default)]
pub enum Obj {
    #[default]
    None,
    /// Immutable byte string; concatenation allocates a new object.
    Str(Vec<u8>),
    /// 1-D when `len1 == 1`. Element storage is column-major:
    /// `(i1 - base1) * len0 * elem_size + (i0 - base0) * elem_size`.
    Array {
        base0: i32,
        base1: i32,
        len0: i32,
        len1: i32,
        elem_size: usize,
        data: Vec<u8>,
    },
    File(FileHandle),
}

#[derive(Debug)]
struct Cell {
    obj: Obj,
    marked: bool,
    free: bool,
    force_free: bool,
    next_free: Option<usize>,
}

#[derive(Debug)]
pub struct Heap {
    cells: Vec<Cell>,
    free_head: Option<usize>,
    in_use: usize,
}

impl Heap {
    pub fn new(num_cells: usize) -> Self {
        let cells = (0..num_cells)
            .map(|i| Cell {
                obj: Obj::None,
                marked: false,
                free: true,
                force_free: false,
                next_free: (i + 1 < num_cells).then_some(i + 1),
            })
            .collect();
        Heap {
            cells,
            free_head: (num_cells > 0).then_some(0),
            in_use: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Length of the free list (walked; test and trace use only).
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_head;
        while let Some(i) = cursor {
            count += 1;
            cursor = self.cells[i].next_free;
        }
        count
    }

    /// Collection threshold from the core design: three quarters of the
    /// arena in use.
    pub fn wants_collection(&self) -> bool {
        self.in_use * 4 >= self.cells.len() * 3
    }

    fn alloc_cell(&mut self, obj: Obj) -> VmResult<u64> {
        let index = self.free_head.ok_or(VmError::HeapExhausted)?;
        let cell = &mut self.cells[index];
        self.free_head = cell.next_free.take();
        cell.free = false;
        cell.force_free = false;
        cell.obj = obj;
        self.in_use += 1;
        Ok(heap_ref(index))
    }

    pub fn alloc_string(&mut self, bytes: Vec<u8>) -> VmResult<u64> {
        self.alloc_cell(Obj::Str(bytes))
    }

    pub fn alloc_array(
        &mut self,
        base0: i32,
        len0: i32,
        base1: i32,
        len1: i32,
        elem_size: usize,
    ) -> VmResult<u64> {
        let total = (len0.max(0) as usize) * (len1.max(0) as usize) * elem_size;
        self.alloc_cell(Obj::Array {
            base0,
            base1,
            len0,
            len1,
            elem_size,
            data: vec![0; total],
        })
    }

    pub fn open_file(&mut self, name: &str, mode: FileMode) -> VmResult<u64> {
        let handle = FileHandle::open(name, mode)?;
        self.alloc_cell(Obj::File(handle))
    }

    /// A reference is valid when it names an in-arena cell that is live.
    pub fn is_valid(&self, word: u64) -> bool {
        as_heap_index(word)
            .and_then(|i| self.cells.get(i))
            .is_some_and(|cell| !cell.free)
    }

    pub fn get(&self, word: u64) -> VmResult<&Obj> {
        let index = as_heap_index(word).ok_or(VmError::SegmentationFault)?;
        let cell = self.cells.get(index).ok_or(VmError::SegmentationFault)?;
        if cell.free {
            return Err(VmError::SegmentationFault);
        }
        Ok(&cell.obj)
    }

    pub fn get_mut(&mut self, word: u64) -> VmResult<&mut Obj> {
        let index = as_heap_index(word).ok_or(VmError::SegmentationFault)?;
        let cell = self.cells.get_mut(index).ok_or(VmError::SegmentationFault)?;
        if cell.free {
            return Err(VmError::SegmentationFault);
        }
        Ok(&mut cell.obj)
    }

    /// Close a file's handle immediately and flag its cell for reclamation
    /// on the next sweep even while references to it remain reachable.
    pub fn close_file(&mut self, word: u64) -> VmResult<()> {
        let index = as_heap_index(word).ok_or(VmError::SegmentationFault)?;
        if let Obj::File(handle) = self.get_mut(word)? {
            handle.close();
        }
        self.cells[index].force_free = true;
        Ok(())
    }

    /// Mark the cell behind `word` if valid, chasing reference elements of
    /// arrays (`elem_size == 8` is the only composite case).
    pub fn mark(&mut self, word: u64) {
        let Some(index) = as_heap_index(word) else {
            return;
        };
        {
            let Some(cell) = self.cells.get_mut(index) else {
                return;
            };
            if cell.free || cell.marked {
                return;
            }
            cell.marked = true;
        }

        let mut children = Vec::new();
        if let Obj::Array {
            elem_size: 8, data, ..
        } = &self.cells[index].obj
        {
            for chunk in data.chunks_exact(8) {
                children.push(u64::from_le_bytes(chunk.try_into().unwrap_or_default()));
            }
        }
        for child in children {
            self.mark(child);
        }
    }

    /// Free every unmarked cell and every force-free cell, clear all
    /// marks, and rebuild free-list membership. Returns cells reclaimed.
    pub fn sweep(&mut self) -> usize {
        let mut collected = 0;
        for index in 0..self.cells.len() {
            let cell = &mut self.cells[index];
            if !cell.free && (!cell.marked || cell.force_free) {
                cell.obj = Obj::None;
                cell.free = true;
                cell.force_free = false;
                cell.next_free = self.free_head;
                self.free_head = Some(index);
                self.in_use -= 1;
                collected += 1;
            }
            cell.marked = false;
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_pops_free_list() {
        let mut heap = Heap::new(4);
        let r = heap.alloc_string(b"abc".to_vec()).unwrap();
        assert!(heap.is_valid(r));
        assert_eq!(heap.in_use(), 1);
        assert_eq!(heap.free_count(), 3);
    }

    #[test]
    fn exhaustion_is_an_error() {
        let mut heap = Heap::new(1);
        heap.alloc_string(Vec::new()).unwrap();
        assert_eq!(heap.alloc_string(Vec::new()), Err(VmError::HeapExhausted));
    }

    #[test]
    fn sweep_reclaims_unmarked_only() {
        let mut heap = Heap::new(4);
        let kept = heap.alloc_string(b"kept".to_vec()).unwrap();
        let lost = heap.alloc_string(b"lost".to_vec()).unwrap();
        heap.mark(kept);
        assert_eq!(heap.sweep(), 1);
        assert!(heap.is_valid(kept));
        assert!(!heap.is_valid(lost));
        // accounting: every cell is on exactly one side
        assert_eq!(heap.in_use() + heap.free_count(), heap.capacity());
    }

    #[test]
    fn force_free_wins_over_mark() {
        let mut heap = Heap::new(2);
        let r = heap.alloc_string(b"f".to_vec()).unwrap();
        let index = as_heap_index(r).unwrap();
        heap.cells[index].force_free = true;
        heap.mark(r);
        assert_eq!(heap.sweep(), 1);
        assert!(!heap.is_valid(r));
    }

    #[test]
    fn marking_chases_array_elements() {
        let mut heap = Heap::new(4);
        let s = heap.alloc_string(b"elem".to_vec()).unwrap();
        let a = heap.alloc_array(1, 2, 0, 1, 8).unwrap();
        if let Obj::Array { data, .. } = heap.get_mut(a).unwrap() {
            data[0..8].copy_from_slice(&s.to_le_bytes());
        }
        heap.mark(a);
        assert_eq!(heap.sweep(), 0);
        assert!(heap.is_valid(s));
    }

    #[test]
    fn stale_reference_fails_validation() {
        let mut heap = Heap::new(2);
        let r = heap.alloc_string(b"gone".to_vec()).unwrap();
        heap.sweep();
        assert!(!heap.is_valid(r));
        assert_eq!(heap.get(r).err(), Some(VmError::SegmentationFault));
    }

    #[test]
    fn stack_and_heap_words_do_not_alias() {
        assert_ne!(heap_ref(3), stack_ref(3));
        assert_eq!(as_heap_index(heap_ref(3)), Some(3));
        assert_eq!(as_stack_slot(stack_ref(3)), Some(3));
        assert_eq!(as_heap_index(stack_ref(3)), None);
        assert_eq!(as_heap_index(0), None);
    }
}
