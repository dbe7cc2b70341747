#![no_main]

use arbitrary::Arbitrary;
use cellar_pool::{CapacityPool, Cell, Config};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    min_size: u16,
    max_size: u16,
    operations: Vec<PoolOperation>,
}

#[derive(Arbitrary, Debug)]
enum PoolOperation {
    Alloc { size: u16 },
    Make { size: u16 },
    CopyFrom { data: Vec<u8> },
    Append { index: u8, data: Vec<u8> },
    Release { index: u8 },
    ReleaseForeign { len: u8, capacity: u16 },
    Write { index: u8, byte: u8 },
}

/// Expected content of a held cell.
struct Held {
    cell: Cell,
    content: Option<Vec<u8>>,
}

fn fuzz(input: FuzzInput) {
    let pool = CapacityPool::new(Config::new(input.min_size as usize, input.max_size as usize));
    let (min_size, max_size) = (pool.min_size(), pool.max_size());
    assert!(min_size <= max_size);

    let mut held: Vec<Held> = Vec::new();
    for op in input.operations {
        match op {
            PoolOperation::Alloc { size } => {
                let size = size as usize;
                let cell = pool.alloc(size);
                assert_eq!(cell.len(), size);
                check_capacity(&cell, size, min_size, max_size);
                held.push(Held {
                    cell,
                    content: None,
                });
            }
            PoolOperation::Make { size } => {
                let size = size as usize;
                let cell = pool.make(size);
                assert!(cell.is_empty());
                check_capacity(&cell, size, min_size, max_size);
                held.push(Held {
                    cell,
                    content: Some(Vec::new()),
                });
            }
            PoolOperation::CopyFrom { data } => {
                let cell = pool.copy_from(&data);
                assert_eq!(cell.as_ref(), data.as_slice());
                held.push(Held {
                    cell,
                    content: Some(data),
                });
            }
            PoolOperation::Append { index, data } => {
                if held.is_empty() {
                    continue;
                }
                let i = index as usize % held.len();
                let Held { cell, content } = held.swap_remove(i);
                let cell = pool.append(cell, &data);
                let content = content.map(|mut c| {
                    c.extend_from_slice(&data);
                    assert_eq!(cell.as_ref(), c.as_slice());
                    c
                });
                held.push(Held { cell, content });
            }
            PoolOperation::Release { index } => {
                if held.is_empty() {
                    continue;
                }
                let i = index as usize % held.len();
                let Held { cell, .. } = held.swap_remove(i);
                let capacity = cell.capacity();
                let canonical = capacity.is_power_of_two()
                    && capacity >= min_size
                    && capacity <= max_size;
                let recycled = pool.release(cell);
                if recycled {
                    assert!(canonical);
                }
            }
            PoolOperation::ReleaseForeign { len, capacity } => {
                let capacity = capacity as usize;
                let mut v = Vec::with_capacity(capacity);
                v.resize((len as usize).min(capacity), 0);
                let capacity = v.capacity();
                let recycled = pool.release(Cell::from(v));
                if !capacity.is_power_of_two() || capacity < min_size || capacity > max_size {
                    assert!(!recycled);
                }
            }
            PoolOperation::Write { index, byte } => {
                if held.is_empty() {
                    continue;
                }
                let i = index as usize % held.len();
                let entry = &mut held[i];
                if entry.cell.remaining() > 0 {
                    entry.cell.extend_from_slice(&[byte]);
                    if let Some(content) = &mut entry.content {
                        content.push(byte);
                    }
                }
            }
        }
    }

    for Held { cell, content } in held {
        if let Some(content) = content {
            assert_eq!(cell.as_ref(), content.as_slice());
        }
        pool.release(cell);
    }
}

fn check_capacity(cell: &Cell, size: usize, min_size: usize, max_size: usize) {
    if size > max_size {
        assert_eq!(cell.capacity(), size);
    } else {
        assert!(cell.capacity().is_power_of_two());
        assert!(cell.capacity() >= size.max(min_size));
        assert!(cell.capacity() < 2 * size.max(min_size));
    }
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
