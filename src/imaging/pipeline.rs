//! Ordered transform pipelines.
//!
//! A pipeline is a list of [`Task`]s. Each task names an operation from a
//! closed registry; its value is bound against that operation's parameter
//! list to produce a typed [`Transform`]. All tasks are bound before any
//! pixels are touched, so a bad task anywhere fails the whole pipeline
//! without doing work.
//!
//! | Operation | Parameters (defaults) | Geometric |
//! |---|---|---|
//! | `crop`, `zoom` | `x, y, w, h` | yes |
//! | `rotate` | `angle = 0` | yes |
//! | `threshold` | `value` | |
//! | `dilate`, `erode`, `opening`, `closing` | `radius, iterations = 1` | |
//! | `gaussian_blur` | `radius` | |
//! | `greyscale`, `invert` | none | |
//! | `adaptive_threshold` | `use_mean = true, radius = 2, c = 0` | |
//!
//! Binding: an absent value uses defaults only; a scalar binds the first
//! parameter; a list binds by position; a map binds by name.

use super::container::ImageContainer;
use super::error::ImageError;
use super::operations;
use super::params::{Param, Region, Task, TaskValue};

/// A bound, ready-to-run operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Crop(Region),
    Rotate(f64),
    Threshold(u8),
    Dilate { radius: u32, iterations: u32 },
    Erode { radius: u32, iterations: u32 },
    Opening { radius: u32, iterations: u32 },
    Closing { radius: u32, iterations: u32 },
    GaussianBlur { radius: u32 },
    Greyscale,
    Invert,
    AdaptiveThreshold { use_mean: bool, radius: u32, c: f64 },
}

impl Transform {
    pub fn apply(&self, image: &ImageContainer) -> ImageContainer {
        match *self {
            Transform::Crop(region) => operations::crop(image, region),
            Transform::Rotate(angle) => operations::rotate(image, angle),
            Transform::Threshold(value) => operations::threshold(image, value),
            Transform::Dilate { radius, iterations } => {
                operations::dilate(image, radius, iterations)
            }
            Transform::Erode { radius, iterations } => operations::erode(image, radius, iterations),
            Transform::Opening { radius, iterations } => {
                operations::opening(image, radius, iterations)
            }
            Transform::Closing { radius, iterations } => {
                operations::closing(image, radius, iterations)
            }
            Transform::GaussianBlur { radius } => operations::gaussian_blur(image, radius),
            Transform::Greyscale => operations::greyscale(image),
            Transform::Invert => operations::invert(image),
            Transform::AdaptiveThreshold {
                use_mean,
                radius,
                c,
            } => operations::adaptive_threshold(image, use_mean, radius, c),
        }
    }

    /// Crop and rotate move pixels without changing their values.
    pub fn is_geometric(&self) -> bool {
        matches!(self, Transform::Crop(_) | Transform::Rotate(_))
    }
}

struct ParamSpec {
    name: &'static str,
    default: Option<Param>,
}

const fn required(name: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        default: None,
    }
}

const fn optional(name: &'static str, default: Param) -> ParamSpec {
    ParamSpec {
        name,
        default: Some(default),
    }
}

struct OperationSpec {
    name: &'static str,
    params: &'static [ParamSpec],
    build: fn(&Arguments) -> Result<Transform, ImageError>,
}

const RECT: &[ParamSpec] = &[
    required("x"),
    required("y"),
    required("w"),
    required("h"),
];
const MORPHOLOGY: &[ParamSpec] = &[required("radius"), optional("iterations", Param::Int(1))];

static REGISTRY: &[OperationSpec] = &[
    OperationSpec {
        name: "crop",
        params: RECT,
        build: build_crop,
    },
    OperationSpec {
        name: "zoom",
        params: RECT,
        build: build_crop,
    },
    OperationSpec {
        name: "rotate",
        params: &[optional("angle", Param::Int(0))],
        build: |args| {
            let angle = args.float("angle")?;
            if !(-180.0..360.0).contains(&angle) {
                return Err(args.invalid(format!(
                    "angle {angle} outside [-180, 180] or [0, 360)"
                )));
            }
            Ok(Transform::Rotate(angle))
        },
    },
    OperationSpec {
        name: "threshold",
        params: &[required("value")],
        build: |args| {
            let value = args.int("value")?;
            let value = u8::try_from(value)
                .map_err(|_| args.invalid(format!("value {value} outside [0, 255]")))?;
            Ok(Transform::Threshold(value))
        },
    },
    OperationSpec {
        name: "dilate",
        params: MORPHOLOGY,
        build: |args| {
            let (radius, iterations) = args.morphology()?;
            Ok(Transform::Dilate { radius, iterations })
        },
    },
    OperationSpec {
        name: "erode",
        params: MORPHOLOGY,
        build: |args| {
            let (radius, iterations) = args.morphology()?;
            Ok(Transform::Erode { radius, iterations })
        },
    },
    OperationSpec {
        name: "opening",
        params: MORPHOLOGY,
        build: |args| {
            let (radius, iterations) = args.morphology()?;
            Ok(Transform::Opening { radius, iterations })
        },
    },
    OperationSpec {
        name: "closing",
        params: MORPHOLOGY,
        build: |args| {
            let (radius, iterations) = args.morphology()?;
            Ok(Transform::Closing { radius, iterations })
        },
    },
    OperationSpec {
        name: "gaussian_blur",
        params: &[required("radius")],
        build: |args| {
            Ok(Transform::GaussianBlur {
                radius: args.count("radius")?,
            })
        },
    },
    OperationSpec {
        name: "greyscale",
        params: &[],
        build: |_| Ok(Transform::Greyscale),
    },
    OperationSpec {
        name: "invert",
        params: &[],
        build: |_| Ok(Transform::Invert),
    },
    OperationSpec {
        name: "adaptive_threshold",
        params: &[
            optional("use_mean", Param::Bool(true)),
            optional("radius", Param::Int(2)),
            optional("c", Param::Int(0)),
        ],
        build: |args| {
            Ok(Transform::AdaptiveThreshold {
                use_mean: args.bool("use_mean")?,
                radius: args.count("radius")?,
                c: args.float("c")?,
            })
        },
    },
];

fn build_crop(args: &Arguments) -> Result<Transform, ImageError> {
    let values = [args.get("x"), args.get("y"), args.get("w"), args.get("h")];
    Region::from_params(values)
        .map(Transform::Crop)
        .ok_or_else(|| args.invalid("rectangle values must be numbers"))
}

/// Names of all registered operations, in registry order.
pub fn operation_names() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|spec| spec.name)
}

/// Parameter values bound to names, defaults filled in.
struct Arguments {
    operation: &'static str,
    values: Vec<(&'static str, Param)>,
}

impl Arguments {
    fn bind(spec: &OperationSpec, value: &TaskValue) -> Result<Self, ImageError> {
        let mut slots: Vec<Option<Param>> = vec![None; spec.params.len()];
        match value {
            TaskValue::Absent => {}
            TaskValue::Scalar(param) => {
                let slot = slots.first_mut().ok_or_else(|| {
                    ImageError::arguments(spec.name, "takes no parameters")
                })?;
                *slot = Some(*param);
            }
            TaskValue::Positional(params) => {
                if params.len() > slots.len() {
                    return Err(ImageError::arguments(
                        spec.name,
                        format!(
                            "takes at most {} positional parameters, got {}",
                            slots.len(),
                            params.len()
                        ),
                    ));
                }
                for (slot, param) in slots.iter_mut().zip(params) {
                    *slot = Some(*param);
                }
            }
            TaskValue::Named(params) => {
                for (key, param) in params {
                    let index = spec
                        .params
                        .iter()
                        .position(|p| p.name == key)
                        .ok_or_else(|| {
                            ImageError::arguments(spec.name, format!("unexpected keyword {key:?}"))
                        })?;
                    slots[index] = Some(*param);
                }
            }
        }

        let values: Vec<(&'static str, Param)> = spec
            .params
            .iter()
            .zip(slots)
            .map(|(p, slot)| {
                slot.or(p.default).map(|v| (p.name, v)).ok_or_else(|| {
                    ImageError::arguments(spec.name, format!("missing parameter {:?}", p.name))
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            operation: spec.name,
            values,
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> ImageError {
        ImageError::arguments(self.operation, reason)
    }

    /// Every name queried by a builder is in its parameter list, so a miss is
    /// a registry bug; it still surfaces as an argument error.
    fn get(&self, name: &str) -> Param {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
            .unwrap_or(Param::Bool(false))
    }

    fn int(&self, name: &str) -> Result<i64, ImageError> {
        self.get(name)
            .as_i64()
            .ok_or_else(|| self.invalid(format!("{name} must be an integer")))
    }

    fn float(&self, name: &str) -> Result<f64, ImageError> {
        self.get(name)
            .as_f64()
            .ok_or_else(|| self.invalid(format!("{name} must be a number")))
    }

    fn bool(&self, name: &str) -> Result<bool, ImageError> {
        self.get(name)
            .as_bool()
            .ok_or_else(|| self.invalid(format!("{name} must be a boolean")))
    }

    /// A radius or repeat count. Values below zero behave like zero.
    fn count(&self, name: &str) -> Result<u32, ImageError> {
        Ok(self.int(name)?.clamp(0, u32::MAX as i64) as u32)
    }

    fn morphology(&self) -> Result<(u32, u32), ImageError> {
        Ok((self.count("radius")?, self.count("iterations")?))
    }
}

/// Resolve and bind a single task.
pub fn compile_task(task: &Task) -> Result<Transform, ImageError> {
    let spec = REGISTRY
        .iter()
        .find(|spec| spec.name == task.name)
        .ok_or_else(|| ImageError::UnknownOperation(task.name.clone()))?;
    let args = Arguments::bind(spec, &task.value)?;
    (spec.build)(&args)
}

/// A compiled list of transforms, applied in the order given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    steps: Vec<(String, Transform)>,
}

impl Pipeline {
    pub fn compile(tasks: &[Task]) -> Result<Self, ImageError> {
        let steps = tasks
            .iter()
            .map(|task| Ok((task.name.clone(), compile_task(task)?)))
            .collect::<Result<_, ImageError>>()?;
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn transforms(&self) -> impl Iterator<Item = &Transform> {
        self.steps.iter().map(|(_, t)| t)
    }

    /// Run every step, or only crop/rotate when `restrict_to_transforms` is set.
    pub fn run(&self, image: &ImageContainer, restrict_to_transforms: bool) -> ImageContainer {
        let mut current = image.clone();
        for (name, transform) in &self.steps {
            if restrict_to_transforms && !transform.is_geometric() {
                log::debug!("Skipping {name}: photometric step in transform-only run");
                continue;
            }
            current = transform.apply(&current);
            log::debug!(
                "{name}: {}x{}x{}",
                current.width(),
                current.height(),
                current.channels()
            );
        }
        current
    }
}

/// Compile `tasks` and run them over `image`.
pub fn process(
    image: &ImageContainer,
    tasks: &[Task],
    restrict_to_transforms: bool,
) -> Result<ImageContainer, ImageError> {
    Ok(Pipeline::compile(tasks)?.run(image, restrict_to_transforms))
}
