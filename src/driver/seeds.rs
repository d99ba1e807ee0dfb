use crate::arena::Arena;
use crate::error::Error;
use crate::error::Result;
use crate::genetic::Individual;
use rand::Rng;
use rand::rngs::SmallRng;
use std::path::Path;

/// load the seeds file: one `string,<data>` or `file,<path>` entry per
/// line. malformed lines are skipped with a trail, never fatal.
pub fn load(path: &Path, arena: &mut Arena) -> Result<Vec<Individual>> {
    let contents =
        std::fs::read_to_string(path).map_err(|_| Error::Seeds(path.to_path_buf()))?;
    let mut seeds = Vec::new();
    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        match parse(line, arena) {
            Some(seed) => seeds.push(seed),
            None => log::error!("unhandled seed line: {:?}", line),
        }
    }
    log::info!("loaded {} seeds", seeds.len());
    Ok(seeds)
}

fn parse(line: &str, arena: &mut Arena) -> Option<Individual> {
    let (kind, value) = line.split_once(',')?;
    match kind {
        "string" => Some(Individual::from_bytes(arena, value.as_bytes())),
        "file" => match std::fs::read(value) {
            Ok(bytes) => Some(Individual::from_bytes(arena, &bytes)),
            Err(_) => {
                log::info!("the seed file {} does not exist", value);
                None
            }
        },
        _ => None,
    }
}

/// no seeds file: start from random buffers around the configured size
pub fn random(
    rng: &mut SmallRng,
    arena: &mut Arena,
    count: usize,
    size: usize,
    deviation: usize,
) -> Vec<Individual> {
    (0..count)
        .map(|_| {
            let span = size.saturating_sub(deviation)
                + rng.random_range(0..(2 * deviation).max(1));
            let bytes = (0..span.max(1))
                .map(|_| crate::genetic::next_char(rng))
                .collect::<Vec<_>>();
            Individual::from_bytes(arena, &bytes)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn string_and_file_seeds_load() {
        let dir = tempfile::tempdir().unwrap();
        let payload = dir.path().join("payload.bin");
        std::fs::write(&payload, b"\x01\x02\x03").unwrap();
        let listing = dir.path().join("seeds.csv");
        std::fs::write(
            &listing,
            format!(
                "string,hello\nfile,{}\nbogus line\nfile,/does/not/exist\n",
                payload.display()
            ),
        )
        .unwrap();
        let mut arena = Arena::default();
        let seeds = load(&listing, &mut arena).unwrap();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0].bytes(&arena), b"hello");
        assert_eq!(seeds[1].bytes(&arena), b"\x01\x02\x03");
    }

    #[test]
    fn missing_listing_is_fatal() {
        let mut arena = Arena::default();
        assert!(load(Path::new("/does/not/exist.csv"), &mut arena).is_err());
    }

    #[test]
    fn random_seeds_stay_near_the_configured_size() {
        let mut arena = Arena::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let seeds = random(&mut rng, &mut arena, 16, 8, 2);
        assert_eq!(seeds.len(), 16);
        for seed in seeds {
            let length = seed.length(&arena);
            assert!((6..=10).contains(&length), "length {}", length);
        }
    }
}
