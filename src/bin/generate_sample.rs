use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::json;

use pthat_combine::container::{Axis, ContainerWriter, Histogram, Object, Opaque};

/// Falling jet spectrum with a soft turn-on at the bin's lower pT-hat edge.
fn spectrum_shape(pt: f64, pthat_lo: f64) -> f64 {
    let turn_on = 1.0 / (1.0 + (-(pt - pthat_lo) / 2.0).exp());
    turn_on * (pt.max(1.0) / 10.0).powf(-4.5)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Per-bin event counts: expected shape scaled to `events`, with Gaussian
/// fluctuations of width sqrt(n).
fn fill(axis: &Axis, pthat_lo: f64, events: f64, rng: &mut SimpleRng) -> Vec<f64> {
    let shape: Vec<f64> = axis.centers().iter().map(|&pt| spectrum_shape(pt, pthat_lo)).collect();
    let norm: f64 = shape.iter().sum();
    shape
        .iter()
        .map(|&s| {
            let mean = events * s / norm;
            rng.gauss(mean, mean.sqrt()).round().max(0.0)
        })
        .collect()
}

fn write_bin(path: &Path, lo: f64, hi: f64, events: f64, rng: &mut SimpleRng) -> Result<()> {
    let pt_axis = Axis::uniform("p_{T} [GeV]", 40, 0.0, 200.0);
    let eta_axis = Axis::uniform("#eta", 20, -1.0, 1.0);

    let pt = fill(&pt_axis, lo, events, rng);
    let eta: Vec<f64> = (0..eta_axis.n_bins())
        .map(|_| rng.gauss(events / 20.0, (events / 20.0).sqrt()).round().max(0.0))
        .collect();

    let mut writer = ContainerWriter::create(path)?;
    writer.put(
        "",
        "spectrum",
        Object::Histogram(
            Histogram::new("jet p_{T}", vec![pt_axis], pt.clone())?
                .with_sumw2(pt)?
                .with_entries(events),
        ),
    )?;
    writer.put(
        "qa",
        "jet_eta",
        Object::Histogram(Histogram::new("jet #eta", vec![eta_axis], eta)?.with_entries(events)),
    )?;
    writer.put(
        "",
        "run_info",
        Object::Opaque(Opaque {
            class_name: "RunInfo".to_string(),
            payload: json!({ "pthat_min": lo, "pthat_max": hi, "events": events }),
        }),
    )?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    let out_dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample"));
    std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);

    // (lo, hi, cross section [mb]) for each pT-hat bin
    let bins = [
        (10.0, 20.0, 5.1e-1),
        (20.0, 40.0, 3.6e-2),
        (40.0, 80.0, 1.7e-3),
        (80.0, 140.0, 5.9e-5),
        (140.0, -1.0, 4.0e-6),
    ];
    let events = 50_000.0;

    let mut entries = Vec::new();
    for (lo, hi, sigma) in bins {
        let hi_token = if hi < 0.0 { "inf".to_string() } else { format!("{hi}") };
        let file = format!("pthat_{lo}_{hi_token}.hcf");
        write_bin(&out_dir.join(&file), lo, hi, events, &mut rng)
            .with_context(|| format!("writing {file}"))?;

        let mut range = json!({ "min": lo });
        if hi > 0.0 {
            range["max"] = json!(hi);
        }
        entries.push(json!({
            "name": format!("{lo}-{hi_token}"),
            "file": file,
            "include": true,
            "use_scale_factor": true,
            "scale_factor": sigma / events,
            "range": range,
        }));
    }

    let config_path = out_dir.join("pthat_add_config.json");
    let config = serde_json::to_string_pretty(&json!({ "pthat_bins": entries }))?;
    std::fs::write(&config_path, config).with_context(|| format!("writing {}", config_path.display()))?;

    println!(
        "Wrote {} bin containers and {} to {}",
        bins.len(),
        config_path.display(),
        out_dir.display()
    );
    Ok(())
}
