//! Meshes and a scripted partner program for tests.

use std::{sync::Arc, thread};

use uom::si::{area::square_meter, f64::Area};

use crate::{
    channel::{Channel, Transport, universe::Universe, wire},
    coupling::{
        CouplingError,
        handshake::{self, Message},
    },
    locator::{ElementBounds, Locator, LocatorConfig, SearchMode},
    mesh::{ElementKind, ParentMesh, Point},
};

/// Vertices of an axis-aligned cube with its lowest corner at `origin`.
///
/// Bottom square first, each square counter-clockwise seen from above.
pub(crate) fn cube(origin: Point, h: f64) -> Vec<Point> {
    let [x, y, z] = origin;
    let square = |z: f64| {
        [
            [x, y, z],
            [x + h, y, z],
            [x + h, y + h, z],
            [x, y + h, z],
        ]
    };
    square(z).into_iter().chain(square(z + h)).collect()
}

/// The unit square at height `z`, in the vertex order of a box mesh's top
/// face.
pub(crate) fn unit_square(z: f64) -> Vec<Point> {
    vec![[0.0, 0.0, z], [1.0, 0.0, z], [1.0, 1.0, z], [0.0, 1.0, z]]
}

/// Structured grid of cubic cells with named boundary face groups.
///
/// Cells are selected with `"all"` or `"none"`. Boundary faces are selected
/// with `"all"`, `"none"` or a group name: `"xmin"`, `"xmax"`, `"ymin"`,
/// `"ymax"`, `"zmin"`, `"zmax"`.
#[derive(Debug, Clone)]
pub(crate) struct BoxMesh {
    cells: Vec<Vec<Point>>,
    faces: Vec<(String, Vec<Point>)>,
}

impl BoxMesh {
    /// Unit cells with the lowest corner at the origin.
    pub(crate) fn new(n: [usize; 3]) -> Self {
        Self::with_geometry(n, [0.0; 3], 1.0)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn with_geometry(n: [usize; 3], origin: Point, h: f64) -> Self {
        let [nx, ny, nz] = n;
        let corner = |i: usize, j: usize, k: usize| {
            [
                origin[0] + i as f64 * h,
                origin[1] + j as f64 * h,
                origin[2] + k as f64 * h,
            ]
        };

        let mut cells = Vec::with_capacity(nx * ny * nz);
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    cells.push(cube(corner(i, j, k), h));
                }
            }
        }

        let mut faces = Vec::new();
        for j in 0..ny {
            for i in 0..nx {
                let quad = |k| {
                    vec![
                        corner(i, j, k),
                        corner(i + 1, j, k),
                        corner(i + 1, j + 1, k),
                        corner(i, j + 1, k),
                    ]
                };
                faces.push(("zmin".to_string(), quad(0)));
                faces.push(("zmax".to_string(), quad(nz)));
            }
        }
        for k in 0..nz {
            for j in 0..ny {
                let quad = |i| {
                    vec![
                        corner(i, j, k),
                        corner(i, j + 1, k),
                        corner(i, j + 1, k + 1),
                        corner(i, j, k + 1),
                    ]
                };
                faces.push(("xmin".to_string(), quad(0)));
                faces.push(("xmax".to_string(), quad(nx)));
            }
            for i in 0..nx {
                let quad = |j| {
                    vec![
                        corner(i, j, k),
                        corner(i + 1, j, k),
                        corner(i + 1, j, k + 1),
                        corner(i, j, k + 1),
                    ]
                };
                faces.push(("ymin".to_string(), quad(0)));
                faces.push(("ymax".to_string(), quad(ny)));
            }
        }

        Self { cells, faces }
    }

    /// Appends a boundary face to a group and returns its id.
    pub(crate) fn push_face(&mut self, group: &str, vertices: Vec<Point>) -> usize {
        self.faces.push((group.to_string(), vertices));
        self.faces.len() - 1
    }

    pub(crate) fn n_boundary_faces(&self) -> usize {
        self.faces.len()
    }

    /// Vertices of the selected elements, in selection order.
    pub(crate) fn elements(&self, kind: ElementKind, criteria: &str) -> Vec<Vec<Point>> {
        self.select(kind, criteria)
            .into_iter()
            .map(|id| self.vertices(kind, id))
            .collect()
    }
}

impl ParentMesh for BoxMesh {
    fn select(&self, kind: ElementKind, criteria: &str) -> Vec<usize> {
        match (kind, criteria) {
            (_, "none") => Vec::new(),
            (ElementKind::Cell, "all") => (0..self.cells.len()).collect(),
            (ElementKind::Cell, _) => Vec::new(),
            (ElementKind::Face, "all") => (0..self.faces.len()).collect(),
            (ElementKind::Face, group) => self
                .faces
                .iter()
                .enumerate()
                .filter(|(_, (name, _))| name == group)
                .map(|(id, _)| id)
                .collect(),
        }
    }

    fn vertices(&self, kind: ElementKind, id: usize) -> Vec<Point> {
        match kind {
            ElementKind::Cell => self.cells[id].clone(),
            ElementKind::Face => self.faces[id].1.clone(),
        }
    }

    fn boundary_face_area(&self, face: usize) -> Area {
        // Newell's formula for planar polygons.
        let vertices = &self.faces[face].1;
        let mut normal = [0.0; 3];
        for (a, b) in vertices.iter().zip(vertices.iter().cycle().skip(1)) {
            normal[0] += (a[1] - b[1]) * (a[2] + b[2]);
            normal[1] += (a[2] - b[2]) * (a[0] + b[0]);
            normal[2] += (a[0] - b[0]) * (a[1] + b[1]);
        }
        let norm = normal.iter().map(|n| n * n).sum::<f64>().sqrt();
        Area::new::<square_meter>(0.5 * norm)
    }
}

/// Behavior of a scripted solid program.
#[derive(Debug, Clone)]
pub(crate) struct SolidScript {
    /// Coupling type sent during negotiation.
    pub token: Message,

    /// Solid boundary faces, if surface coupled.
    pub faces: Option<Vec<Vec<Point>>>,

    /// Solid cells, if volume coupled.
    pub cells: Option<Vec<Vec<Point>>>,

    /// Reply to the start message.
    pub start_reply: Message,

    pub iterations: usize,

    /// Coefficient returned for each global flux, if conservativity is on.
    pub coefficient: Option<f64>,
}

impl SolidScript {
    pub(crate) fn new(faces: Option<Vec<Vec<Point>>>, cells: Option<Vec<Vec<Point>>>) -> Self {
        Self {
            token: Message::CouplingType {
                surface: faces.is_some(),
                volume: cells.is_some(),
                conservativity: false,
            },
            faces,
            cells,
            start_reply: Message::Start,
            iterations: 1,
            coefficient: None,
        }
    }
}

/// Solid temperature the scripted solid imposes at a point.
pub(crate) fn solid_temperature(point: Point) -> f64 {
    300.0 + point[0]
}

/// What the scripted solid received.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct SolidLog {
    /// Interleaved `(tf, hf)` at each solid face center, per iteration.
    pub surface_values: Vec<Vec<f64>>,

    /// Interleaved `(tf, hf)` at each solid cell center, per iteration.
    pub volume_values: Vec<Vec<f64>>,

    pub global_fluxes: Vec<f64>,

    /// Fluid face centers located on the solid faces, as received.
    pub fluid_face_centers: Vec<Point>,
}

/// Plays the solid side of the coupling protocol on one rank.
pub(crate) fn run_solid(
    transport: Arc<dyn Transport>,
    fluid_root: usize,
    script: SolidScript,
) -> Result<SolidLog, CouplingError> {
    let channel = Channel::connect(transport, fluid_root)?;
    handshake::exchange(&channel, &script.token)?;

    let locate = |elements: &[Vec<Point>], mode| -> Result<Locator, CouplingError> {
        let bounds: Vec<ElementBounds> = elements
            .iter()
            .map(|vertices| ElementBounds::from_vertices(vertices))
            .collect();
        let centers: Vec<Point> = bounds.iter().map(ElementBounds::center).collect();
        let mut locator = Locator::new(
            channel.clone(),
            LocatorConfig {
                mode,
                ..LocatorConfig::default()
            },
        );
        locator.locate(&bounds, &centers)?;
        Ok(locator)
    };

    let mut log = SolidLog::default();

    let mut surface = match &script.faces {
        Some(faces) => {
            let mut locator = locate(faces, SearchMode::Closest)?;
            let distances = locator.point_distances().to_vec();
            locator.send_from_points(&distances, 1)?;
            log.fluid_face_centers = locator.dist_points().map(|p| p.coords).collect();
            Some(locator)
        }
        None => None,
    };
    let mut volume = match &script.cells {
        Some(cells) => Some(locate(cells, SearchMode::Containment)?),
        None => None,
    };

    handshake::exchange(&channel, &script.start_reply)?;

    for _ in 0..script.iterations {
        if let Some(locator) = &mut surface {
            log.surface_values.push(exchange_fields(locator)?);

            if let Some(coefficient) = script.coefficient {
                let flux = channel.recv(fluid_root)?;
                log.global_fluxes.push(wire::decode_one(&flux)?);
                channel.send(fluid_root, wire::encode(&[coefficient]))?;
            }
        }
        if let Some(locator) = &mut volume {
            log.volume_values.push(exchange_fields(locator)?);
        }
    }

    Ok(log)
}

fn exchange_fields(locator: &mut Locator) -> Result<Vec<f64>, CouplingError> {
    let temperatures: Vec<f64> = locator
        .dist_points()
        .map(|p| solid_temperature(p.coords))
        .collect();
    locator.send_to_points(&temperatures, 1)?;

    let mut received = vec![f64::NAN; 2 * locator.n_points()];
    locator.recv_at_points(&mut received, 2)?;
    Ok(received)
}

/// Runs `fluid` on each rank of an `n_fluid` rank program coupled with a
/// single-rank scripted solid.
///
/// Fluid ranks are joined first so their channels close before the solid is
/// awaited.
pub(crate) fn run_coupled<R, F>(
    n_fluid: usize,
    script: SolidScript,
    fluid: F,
) -> (Vec<R>, Result<SolidLog, CouplingError>)
where
    R: Send + 'static,
    F: Fn(usize, Arc<dyn Transport>, usize) -> R + Send + Sync + Clone + 'static,
{
    let mut endpoints = Universe::launch(&[("fluid", n_fluid), ("solid", 1)]);
    let solid_root = n_fluid;

    let solid_endpoint = endpoints.pop().expect("solid endpoint should exist");
    let solid = thread::spawn(move || {
        let transport: Arc<dyn Transport> = Arc::new(solid_endpoint);
        run_solid(transport, 0, script)
    });

    let fluids: Vec<_> = endpoints
        .into_iter()
        .enumerate()
        .map(|(rank, endpoint)| {
            let fluid = fluid.clone();
            thread::spawn(move || {
                let transport: Arc<dyn Transport> = Arc::new(endpoint);
                fluid(rank, transport, solid_root)
            })
        })
        .collect();

    let results = fluids
        .into_iter()
        .map(|handle| handle.join().expect("fluid rank panicked"))
        .collect();
    let log = solid.join().expect("solid rank panicked");

    (results, log)
}
