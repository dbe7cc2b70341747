#![no_main]

use arbitrary::Arbitrary;
use cellar_pool::{Buffer, CapacityPool, Config};
use libfuzzer_sys::fuzz_target;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::{Cursor, Read};

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    seed: u64,
    operations: Vec<BufferOperation>,
}

#[derive(Arbitrary, Debug)]
enum BufferOperation {
    Append { data: Vec<u8> },
    Push { byte: u8 },
    Set { data: Vec<u8> },
    Reserve { additional: u16 },
    Grow { additional: u8 },
    Truncate { len: u16 },
    Reset,
    ReadFrom { len: u16 },
    Clone,
    Share { holders: u8 },
}

fn fuzz(input: FuzzInput) {
    let mut rng = StdRng::seed_from_u64(input.seed);
    let pool = CapacityPool::new(Config::new(rng.gen_range(0..64), rng.gen_range(0..4096)));

    let mut buf = Buffer::get(&pool);
    let mut expected: Vec<u8> = Vec::new();
    for op in input.operations {
        match op {
            BufferOperation::Append { data } => {
                buf.append(&data);
                expected.extend_from_slice(&data);
            }
            BufferOperation::Push { byte } => {
                buf.push(byte);
                expected.push(byte);
            }
            BufferOperation::Set { data } => {
                buf.set(&data);
                expected = data;
            }
            BufferOperation::Reserve { additional } => {
                let additional = additional as usize;
                buf.reserve(additional);
                assert!(buf.capacity() - buf.len() >= additional);
            }
            BufferOperation::Grow { additional } => {
                let additional = additional as usize;
                buf.grow(additional);
                let start = expected.len();
                expected.extend_from_slice(&buf[start..]);
            }
            BufferOperation::Truncate { len } => {
                let len = (len as usize).min(buf.len());
                buf.truncate(len);
                expected.truncate(len);
            }
            BufferOperation::Reset => {
                buf.reset();
                expected.clear();
            }
            BufferOperation::ReadFrom { len } => {
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                let n = buf.read_from(&mut Cursor::new(&data)).unwrap();
                assert_eq!(n, data.len());
                expected.extend_from_slice(&data);
            }
            BufferOperation::Clone => {
                let copy = buf.clone();
                assert_eq!(copy.as_ref(), expected.as_slice());
                buf = copy;
            }
            BufferOperation::Share { holders } => {
                let shared = buf.share();
                let holders = holders as usize % 8;
                shared.ref_add(holders as i64);
                let handles: Vec<_> = (0..holders).map(|_| shared.handle()).collect();

                let mut reader = shared.reader();
                let mut out = Vec::new();
                reader.read_to_end(&mut out).unwrap();
                assert_eq!(out, expected);
                assert!(!reader.release());

                let released = handles
                    .into_iter()
                    .map(|h| h.release())
                    .chain(std::iter::once(shared.release()))
                    .filter(|r| *r)
                    .count();
                assert_eq!(released, 1);

                buf = Buffer::from_slice(&pool, &expected);
            }
        }
        assert_eq!(buf.as_ref(), expected.as_slice());
    }
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
