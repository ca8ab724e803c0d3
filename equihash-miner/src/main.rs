use std::env;
use std::process;

use anyhow::{anyhow, ensure, Context};
use equihash::{Params, Solver, SolverConfig};
use gumdrop::{Options, ParsingStyle};
use tracing::info;

/// The length of a block header including its nonce.
const HEADER_NONCE_LEN: usize = 140;

/// The length of a block header without its nonce.
const INPUT_LEN: usize = 108;

#[derive(Debug, Options)]
struct MinerOptions {
    #[options(help = "Print this help output")]
    help: bool,

    #[options(
        no_short,
        help = "Header text, zero-padded to the 140-byte header+nonce buffer"
    )]
    header: Option<String>,

    #[options(
        short = "x",
        help = "Hex-encoded 140-byte header+nonce buffer (overrides --header)"
    )]
    hex: Option<String>,

    #[options(help = "First nonce to try", default = "0")]
    nonce: u32,

    #[options(help = "Number of consecutive nonces to try", default = "1")]
    range: u32,

    #[options(help = "Number of worker threads", default = "1")]
    threads: usize,

    #[options(
        short = "p",
        help = "Index of the 32-bit word of the buffer that holds the nonce",
        default = "32"
    )]
    nonce_pos: usize,

    #[options(short = "s", help = "Print the indices and encoding of each solution")]
    show_solutions: bool,

    #[options(no_short, help = "Equihash n parameter", default = "200")]
    equihash_n: u32,

    #[options(no_short, help = "Equihash k parameter", default = "9")]
    equihash_k: u32,

    #[options(no_short, help = "Leading bits of each collision word that select a bucket")]
    bucket_bits: Option<usize>,

    #[options(no_short, help = "Number of entries each bucket can hold")]
    bucket_capacity: Option<usize>,

    #[options(
        no_short,
        help = "Stop expanding candidates after this many solutions per nonce",
        default = "8"
    )]
    max_solutions: usize,
}

impl MinerOptions {
    fn solver_config(&self) -> SolverConfig {
        let mut config = SolverConfig::default()
            .threads(self.threads)
            .max_solutions(self.max_solutions);
        if let Some(bucket_bits) = self.bucket_bits {
            config = config.bucket_bits(bucket_bits);
        }
        if let Some(capacity) = self.bucket_capacity {
            config = config.bucket_capacity(capacity);
        }
        config
    }
}

/// Builds the header+nonce buffer from the header options.
fn header_nonce(opts: &MinerOptions) -> anyhow::Result<[u8; HEADER_NONCE_LEN]> {
    let mut buf = [0; HEADER_NONCE_LEN];
    if let Some(hex) = &opts.hex {
        let bytes = hex::decode(hex).context("--hex is not valid hex")?;
        ensure!(
            bytes.len() == HEADER_NONCE_LEN,
            "--hex must encode {} bytes, got {}",
            HEADER_NONCE_LEN,
            bytes.len()
        );
        buf.copy_from_slice(&bytes);
    } else if let Some(header) = &opts.header {
        ensure!(
            header.len() <= HEADER_NONCE_LEN,
            "--header must be at most {} bytes",
            HEADER_NONCE_LEN
        );
        buf[..header.len()].copy_from_slice(header.as_bytes());
    }
    Ok(buf)
}

/// Writes `nonce` as a little-endian 32-bit word at word index `pos`.
fn set_nonce(buf: &mut [u8; HEADER_NONCE_LEN], pos: usize, nonce: u32) {
    buf[4 * pos..4 * pos + 4].copy_from_slice(&nonce.to_le_bytes());
}

fn main() -> anyhow::Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let opts = MinerOptions::parse_args(&args[1..], ParsingStyle::default()).unwrap_or_else(|e| {
        eprintln!("{}: {}", args[0], e);
        process::exit(2);
    });

    if opts.help_requested() {
        println!("Usage: {} [OPTIONS]", args[0]);
        println!();
        println!("{}", MinerOptions::usage());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    ensure!(
        4 * opts.nonce_pos + 4 <= HEADER_NONCE_LEN,
        "--nonce-pos must be at most {}",
        HEADER_NONCE_LEN / 4 - 1
    );
    let params = Params::new(opts.equihash_n, opts.equihash_k).ok_or_else(|| {
        anyhow!(
            "invalid Equihash parameters ({}, {})",
            opts.equihash_n,
            opts.equihash_k
        )
    })?;
    let mut buf = header_nonce(&opts)?;
    let solver = Solver::new(params, opts.solver_config())?;

    info!(
        header = opts.header.as_deref().unwrap_or(""),
        hex = opts.hex.is_some(),
        nonce = opts.nonce,
        range = opts.range,
        nonce_pos = opts.nonce_pos,
        "Looking for wagner-tree with {} {}-bit digits and {} threads",
        params.k() + 1,
        params.collision_bit_length(),
        opts.threads,
    );
    info!(
        "Using 2^{} buckets, {}MB of memory",
        solver.bucket_bits(),
        solver.memory_estimate() >> 20,
    );

    let mut total = 0;
    for r in 0..opts.range {
        set_nonce(&mut buf, opts.nonce_pos, opts.nonce.wrapping_add(r));
        let (input, nonce) = buf.split_at(INPUT_LEN);
        let solutions = solver.solve(input, nonce);

        if opts.show_solutions {
            for solution in &solutions {
                println!();
                println!("Solution [{}]", params.proof_size());
                for index in solution.indices() {
                    print!(" {:x}", index);
                }
                println!();
                println!("Encoded");
                println!("{}", hex::encode(solution.minimal()));
            }
        }
        if !solutions.is_empty() {
            println!();
            println!("Nonce {} {} solutions", hex::encode(nonce), solutions.len());
        }
        total += solutions.len();
    }
    println!("{} total solutions", total);

    Ok(())
}
