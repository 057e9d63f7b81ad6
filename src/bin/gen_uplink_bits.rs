//! `sounder-gen-uplink-bits`: minimal offline tool that writes a random
//! complex-float uplink data file in the `ul_data_{f,t}_...bin` layout the
//! waveform composer reads back.

use std::path::PathBuf;

use clap::Parser;

use sounder::waveform::uplink_file_name;

#[derive(Parser, Debug)]
#[command(name = "sounder-gen-uplink-bits", about = "Generate a synthetic uplink data file")]
struct Args {
    #[arg(long, default_value = "./ul_data")]
    output_dir: PathBuf,

    #[arg(long, default_value = "QPSK")]
    modulation: String,

    #[arg(long, default_value_t = 64)]
    subcarrier_num: usize,

    #[arg(long, default_value_t = 64)]
    fft_size: usize,

    #[arg(long, default_value_t = 1)]
    symbols_per_subframe: usize,

    #[arg(long, default_value_t = 1)]
    ul_slots: usize,

    #[arg(long, default_value_t = 0)]
    ul_data_frame_num: usize,

    #[arg(long, default_value_t = 1)]
    channel: usize,

    #[arg(long, default_value_t = 0)]
    sdr_index: usize,

    #[arg(long, default_value_t = 80)]
    samps_per_symbol: usize,
}

fn write_random_iq_file(path: &std::path::Path, sample_count: usize) -> std::io::Result<()> {
    let mut bytes = Vec::with_capacity(sample_count * 8);
    let mut state: u64 = 0x9e3779b97f4a7c15;
    for _ in 0..sample_count {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let re = ((state >> 33) as u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let im = ((state >> 33) as u32 as f32 / u32::MAX as f32) * 2.0 - 1.0;
        bytes.extend_from_slice(&re.to_le_bytes());
        bytes.extend_from_slice(&im.to_le_bytes());
    }
    std::fs::write(path, bytes)
}

fn main() -> anyhow::Result<()> {
    sounder::init_logging(tracing::Level::INFO);
    let args = Args::parse();

    std::fs::create_dir_all(&args.output_dir)?;

    let freq_name = uplink_file_name(
        "ul_data_f",
        &args.modulation,
        args.subcarrier_num,
        args.fft_size,
        args.symbols_per_subframe,
        args.ul_slots,
        args.ul_data_frame_num,
        args.channel,
        args.sdr_index,
    );
    let time_name = uplink_file_name(
        "ul_data_t",
        &args.modulation,
        args.subcarrier_num,
        args.fft_size,
        args.symbols_per_subframe,
        args.ul_slots,
        args.ul_data_frame_num,
        args.channel,
        args.sdr_index,
    );

    let freq_samples = args.ul_slots * args.channel * args.fft_size * args.symbols_per_subframe;
    let time_samples = args.ul_slots * args.channel * args.samps_per_symbol;

    write_random_iq_file(&args.output_dir.join(&freq_name), freq_samples)?;
    write_random_iq_file(&args.output_dir.join(&time_name), time_samples)?;

    tracing::info!(freq_name = %freq_name, time_name = %time_name, "wrote uplink data files");
    Ok(())
}
