//! Ternary text-model training binary.
//!
//! Trains a sparse ternary network for next-character prediction on a text
//! file (or a built-in phrase), then generates a short continuation from a
//! seed string.

use clap::Parser;
use ndarray::Array1;
use std::io::Write;
use std::path::PathBuf;
use tritnet::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint};
use tritnet::data::samples::{load_text, window_matrices};
use tritnet::data::vocab::{Alphabet, TRITS_PER_CHAR};
use tritnet::training::{dataset_loss, fit};
use tritnet::TritNet;

const DEFAULT_TEXT: &str = "hello world this is a tiny ternary model learning to speak ";

#[derive(Parser, Debug)]
#[command(
    name = "tritnet-train",
    about = "Train a sparse ternary network on text for next-character prediction"
)]
struct Args {
    /// Training text file; omit to use a built-in phrase
    #[arg(long)]
    text: Option<PathBuf>,

    /// Sliding window size (characters of context)
    #[arg(long, default_value_t = 5)]
    window_size: usize,

    /// Hidden layer size
    #[arg(long, default_value_t = 40)]
    hidden_size: usize,

    /// Fraction of hidden-layer edges that are active
    #[arg(long, default_value_t = 0.2)]
    density: f32,

    /// Number of training epochs
    #[arg(long, default_value_t = 3000)]
    epochs: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.05)]
    learning_rate: f32,

    /// Print loss every N epochs (0 = no logging)
    #[arg(long, default_value_t = 100)]
    log_interval: usize,

    /// Save a checkpoint here after training
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Resume from a checkpoint instead of starting fresh
    #[arg(long)]
    resume: Option<PathBuf>,

    /// Characters to generate after training
    #[arg(long, default_value_t = 50)]
    generate: usize,

    /// Seed string for generation
    #[arg(long, default_value = "hello")]
    seed: String,
}

fn main() {
    let args = Args::parse();
    let alphabet = Alphabet::new();

    let text = match &args.text {
        Some(path) => load_text(path).expect("failed to read training text"),
        None => DEFAULT_TEXT.repeat(5),
    };

    let (inputs, targets) = window_matrices(&alphabet, &text, args.window_size);
    let input_size = args.window_size * TRITS_PER_CHAR;
    eprintln!(
        "training on {} samples ({} -> {} (density {}) -> {})",
        inputs.nrows(),
        input_size,
        args.hidden_size,
        args.density,
        TRITS_PER_CHAR
    );

    let (mut net, start_epoch) = if let Some(ref path) = args.resume {
        let ckpt = load_checkpoint(path).expect("failed to load checkpoint");
        eprintln!(
            "resumed from {} (epoch {}, loss {:.6})",
            path.display(),
            ckpt.epoch,
            ckpt.loss
        );
        (ckpt.net, ckpt.epoch)
    } else {
        let mut net = TritNet::new();
        net.add_layer(input_size, args.hidden_size, args.density)
            .expect("failed to add hidden layer");
        net.add_layer(args.hidden_size, TRITS_PER_CHAR, 1.0)
            .expect("failed to add output layer");
        (net, 0)
    };
    net.set_learning_rate(args.learning_rate);

    let final_loss = fit(&mut net, &inputs, &targets, args.epochs, args.log_interval)
        .expect("training failed");
    println!("final loss after {} epochs: {:.6}", args.epochs, final_loss);

    if let Some(ref path) = args.checkpoint {
        let loss = dataset_loss(&net, &inputs, &targets).expect("loss evaluation failed");
        save_checkpoint(
            path,
            &Checkpoint {
                epoch: start_epoch + args.epochs,
                loss,
                net: net.clone(),
            },
        )
        .expect("failed to save checkpoint");
        eprintln!("checkpoint written to {}", path.display());
    }

    if args.generate > 0 {
        generate(&net, &alphabet, &args.seed, args.window_size, args.generate);
    }
}

/// Autoregressive sampling: encode the last `window_size` characters, predict
/// the next one, append, repeat.
fn generate(net: &TritNet, alphabet: &Alphabet, seed: &str, window_size: usize, count: usize) {
    let mut context: Vec<char> = seed.chars().map(|c| c.to_ascii_lowercase()).collect();
    // Left-pad short seeds with spaces so the first window is full
    while context.len() < window_size {
        context.insert(0, ' ');
    }

    println!("\nseed: {:?}", seed);
    print!("{}", seed);
    let mut stdout = std::io::stdout();

    for _ in 0..count {
        let mut trits = Vec::with_capacity(window_size * TRITS_PER_CHAR);
        for &c in &context[context.len() - window_size..] {
            trits.extend_from_slice(&alphabet.encode(c));
        }

        let output = net
            .predict(&Array1::from_vec(trits))
            .expect("prediction failed");
        let next = alphabet.decode(output.as_slice().expect("contiguous output"));

        print!("{}", next);
        stdout.flush().ok();
        context.push(next);
    }
    println!();
}
