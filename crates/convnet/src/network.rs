use scheduler::Generator;
use thiserror::Error;
use tracing::debug;

use crate::queue::{Command, CommandQueue};
use crate::texture::Texture;
use crate::weights::{WeightError, WeightTable};

const KERNEL: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvError {
    #[error("a run is already in flight")]
    AlreadyRunning,
    #[error("result requested before the run finished")]
    StillRunning,
    #[error("no finished run to read back")]
    NoResult,
    #[error("generator has been disposed")]
    Disposed,
    #[error("source texture is empty")]
    EmptySource,
}

/// One 3x3 convolution with zero padding.
#[derive(Debug, Clone)]
struct ConvLayer {
    inputs: usize,
    outputs: usize,
    /// `[outputs, inputs, 3, 3]` row-major.
    weight: Vec<f32>,
    bias: Vec<f32>,
}

impl ConvLayer {
    fn from_table(table: &WeightTable, index: usize) -> Result<Self, WeightError> {
        let weight_name = format!("conv{index}.weight");
        let bias_name = format!("conv{index}.bias");
        let weight = table.require(&weight_name)?;
        let bias = table.require(&bias_name)?;
        weight.check(&weight_name)?;
        bias.check(&bias_name)?;

        let [outputs, inputs, kh, kw] = weight.shape[..] else {
            return Err(WeightError::Shape {
                name: weight_name,
                expected: "[out, in, 3, 3]".into(),
                actual: weight.shape.clone(),
            });
        };
        if kh != KERNEL || kw != KERNEL || outputs == 0 || inputs == 0 {
            return Err(WeightError::Shape {
                name: weight_name,
                expected: "[out, in, 3, 3]".into(),
                actual: weight.shape.clone(),
            });
        }
        if bias.shape != [outputs] {
            return Err(WeightError::Shape {
                name: bias_name,
                expected: format!("[{outputs}]"),
                actual: bias.shape.clone(),
            });
        }

        Ok(Self {
            inputs,
            outputs,
            weight: weight.data.clone(),
            bias: bias.data.clone(),
        })
    }

    fn weight(&self, out: usize, input: usize, ky: usize, kx: usize) -> f32 {
        self.weight[((out * self.inputs + input) * KERNEL + ky) * KERNEL + kx]
    }

    /// Multiply-accumulates needed for one output row.
    fn row_macs(&self, width: usize) -> u64 {
        (width * self.inputs * self.outputs * KERNEL * KERNEL) as u64
    }
}

/// Shape of a convolution stack, without any run state.
#[derive(Debug, Clone)]
pub struct ConvNet {
    layers: Vec<ConvLayer>,
}

impl ConvNet {
    /// Collects `conv0`, `conv1`, ... until the first missing weight. The
    /// stack must take RGB in, give RGB out, and chain channel counts.
    pub fn from_table(table: &WeightTable) -> Result<Self, WeightError> {
        let mut layers: Vec<ConvLayer> = Vec::new();
        while table.get(&format!("conv{}.weight", layers.len())).is_some() {
            let index = layers.len();
            let layer = ConvLayer::from_table(table, index)?;
            let expected_inputs = layers.last().map_or(Texture::CHANNELS, |prev| prev.outputs);
            if layer.inputs != expected_inputs {
                return Err(WeightError::Shape {
                    name: format!("conv{index}.weight"),
                    expected: format!("{expected_inputs} input channels"),
                    actual: vec![layer.outputs, layer.inputs, KERNEL, KERNEL],
                });
            }
            layers.push(layer);
        }

        let Some(last) = layers.last() else {
            return Err(WeightError::Empty);
        };
        if last.outputs != Texture::CHANNELS {
            let index = layers.len() - 1;
            return Err(WeightError::Shape {
                name: format!("conv{index}.weight"),
                expected: format!("{} output channels", Texture::CHANNELS),
                actual: vec![last.outputs, last.inputs, KERNEL, KERNEL],
            });
        }
        Ok(Self { layers })
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Total cost of one run over a `width` x `height` image.
    pub fn run_cost(&self, width: u32, height: u32) -> f32 {
        let macs: u64 = self
            .layers
            .iter()
            .map(|layer| layer.row_macs(width as usize) * u64::from(height))
            .sum();
        macs as f32 / 1000.0
    }
}

#[derive(Debug)]
struct RunProgress {
    width: usize,
    height: usize,
    layer: usize,
    row: usize,
    /// Activations feeding the current layer, pixel-interleaved.
    input: Vec<f32>,
    output: Vec<f32>,
    finished: bool,
}

/// Steps a [`ConvNet`] over an image one band of rows at a time.
///
/// Each step convolves `rows_per_step` rows of a single layer and reports
/// its multiply-accumulate count divided by 1000 as cost. Hidden layers use
/// ReLU; the last layer clamps to `[0, 1]`.
#[derive(Debug)]
pub struct ConvGenerator {
    net: ConvNet,
    rows_per_step: usize,
    queue: CommandQueue,
    run: Option<RunProgress>,
    disposed: bool,
}

impl ConvGenerator {
    pub fn new(net: ConvNet, rows_per_step: u32, queue: CommandQueue) -> Self {
        Self {
            net,
            rows_per_step: rows_per_step.max(1) as usize,
            queue,
            run: None,
            disposed: false,
        }
    }

    pub fn from_table(
        table: &WeightTable,
        rows_per_step: u32,
        queue: CommandQueue,
    ) -> Result<Self, WeightError> {
        Ok(Self::new(ConvNet::from_table(table)?, rows_per_step, queue))
    }

    pub fn net(&self) -> &ConvNet {
        &self.net
    }

    pub fn rows_per_step(&self) -> usize {
        self.rows_per_step
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn convolve_band(&mut self) -> f32 {
        let Some(run) = self.run.as_mut() else {
            return 0.0;
        };
        let layer = &self.net.layers[run.layer];
        let last = run.layer + 1 == self.net.layers.len();
        let end = (run.row + self.rows_per_step).min(run.height);

        for y in run.row..end {
            for x in 0..run.width {
                let base = (y * run.width + x) * layer.outputs;
                for out in 0..layer.outputs {
                    let mut acc = layer.bias[out];
                    for ky in 0..KERNEL {
                        let Some(sy) = (y + ky).checked_sub(1).filter(|sy| *sy < run.height)
                        else {
                            continue;
                        };
                        for kx in 0..KERNEL {
                            let Some(sx) = (x + kx).checked_sub(1).filter(|sx| *sx < run.width)
                            else {
                                continue;
                            };
                            let src = (sy * run.width + sx) * layer.inputs;
                            for input in 0..layer.inputs {
                                acc += layer.weight(out, input, ky, kx) * run.input[src + input];
                            }
                        }
                    }
                    run.output[base + out] = if last {
                        acc.clamp(0.0, 1.0)
                    } else {
                        acc.max(0.0)
                    };
                }
            }
        }

        let rows = end - run.row;
        let cost = (layer.row_macs(run.width) * rows as u64) as f32 / 1000.0;
        self.queue.record(Command::Convolve {
            layer: run.layer,
            rows: rows as u32,
            cost,
        });

        run.row = end;
        if run.row >= run.height {
            run.layer += 1;
            run.row = 0;
            run.input = std::mem::take(&mut run.output);
            match self.net.layers.get(run.layer) {
                Some(next) => run.output = vec![0.0; run.width * run.height * next.outputs],
                None => run.finished = true,
            }
        }
        cost
    }
}

impl Generator for ConvGenerator {
    type Source = Texture;
    type Output = Texture;
    type Error = ConvError;

    fn start(&mut self, source: &Texture) -> Result<(), ConvError> {
        if self.disposed {
            return Err(ConvError::Disposed);
        }
        if self.is_running() {
            return Err(ConvError::AlreadyRunning);
        }
        if source.pixel_count() == 0 {
            return Err(ConvError::EmptySource);
        }

        let width = source.width() as usize;
        let height = source.height() as usize;
        let first = self.net.layers[0].outputs;
        self.queue.record(Command::Upload {
            pixels: source.pixel_count(),
        });
        self.run = Some(RunProgress {
            width,
            height,
            layer: 0,
            row: 0,
            input: source.data().to_vec(),
            output: vec![0.0; width * height * first],
            finished: false,
        });
        Ok(())
    }

    fn step(&mut self) -> f32 {
        if !self.is_running() {
            return 0.0;
        }
        self.convolve_band()
    }

    fn is_running(&self) -> bool {
        self.run.as_ref().is_some_and(|run| !run.finished)
    }

    fn get_result(&mut self, output: &mut Texture) -> Result<(), ConvError> {
        if self.disposed {
            return Err(ConvError::Disposed);
        }
        match self.run.take() {
            None => Err(ConvError::NoResult),
            Some(run) if !run.finished => {
                self.run = Some(run);
                Err(ConvError::StillRunning)
            }
            Some(run) => {
                let pixels = run.width * run.height;
                self.queue.record(Command::Readback { pixels });
                output.replace(run.width as u32, run.height as u32, run.input);
                Ok(())
            }
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.run = None;
        self.queue.discard();
        self.disposed = true;
        debug!(layers = self.net.depth(), "convolution generator disposed");
    }
}
