//! Stress run for the arena: rounds of random allocations followed by
//! freeing all of them.
//!
//! Usage: `buddy-arena-stress [capacity_pages] [rounds] [seed]`

use buddy_arena::{arena_error, arena_info, MemoryManager};
use log::LevelFilter;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::error::Error;

const ALLOCATIONS_PER_ROUND: usize = 100;
const MAX_REQUEST: usize = 256;

fn arg_or<T: std::str::FromStr>(args: &[String], index: usize, default: T) -> Result<T, String> {
    match args.get(index) {
        Some(value) => value
            .parse()
            .map_err(|_| format!("invalid argument #{}: {}", index, value)),
        None => Ok(default),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    buddy_arena::initialize_logging(LevelFilter::Trace)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let capacity_pages = arg_or(&args, 0, 16usize)?;
    let rounds = arg_or(&args, 1, 16usize)?;
    let seed = arg_or(&args, 2, 0u64)?;

    let mut manager = MemoryManager::new(capacity_pages)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    for round in 0..rounds {
        let mut offsets = Vec::with_capacity(ALLOCATIONS_PER_ROUND);
        for _ in 0..ALLOCATIONS_PER_ROUND {
            let size = rng.gen_range(0, MAX_REQUEST + 1);
            match manager.allocate(size) {
                Ok(offset) => {
                    arena_info!("alloc {} in {}", size, offset);
                    offsets.push(offset);
                }
                Err(error) => {
                    arena_error!("alloc {} failed: {}", size, error);
                    return Err(error.into());
                }
            }
        }

        for offset in offsets {
            manager.free(offset)?;
            arena_info!("free {}", offset);
        }
        arena_info!("round {} done with {} pages", round, manager.page_count());
    }

    log::logger().flush();
    print!("{}", manager);
    Ok(())
}
