//! Beam cross-sections

use serde::{Deserialize, Serialize};

use super::{SectionMaterial, UniaxialMaterial};
use crate::error::{FemError, FemResult};
use crate::math::{Mat2, Vec2};

/// Elastic section: N = EA ε, M = EI κ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticSection {
    /// Modulus of elasticity
    pub e: f64,
    /// Cross-sectional area
    pub area: f64,
    /// Second moment of area about the bending axis
    pub inertia: f64,
    strain: Vec2,
}

impl ElasticSection {
    pub fn new(e: f64, area: f64, inertia: f64) -> FemResult<Self> {
        if e <= 0.0 || area <= 0.0 || inertia <= 0.0 {
            return Err(FemError::InvalidMaterial(format!(
                "section properties must be positive (E={}, A={}, I={})",
                e, area, inertia
            )));
        }
        Ok(Self {
            e,
            area,
            inertia,
            strain: Vec2::zeros(),
        })
    }

    /// Solid rectangle of width `b` and depth `h`
    pub fn rectangular(e: f64, b: f64, h: f64) -> FemResult<Self> {
        Self::new(e, b * h, b * h.powi(3) / 12.0)
    }
}

impl SectionMaterial for ElasticSection {
    fn set_strain(&mut self, strain: &Vec2) -> FemResult<()> {
        self.strain = *strain;
        Ok(())
    }

    fn strain(&self) -> Vec2 {
        self.strain
    }

    fn stress(&self) -> Vec2 {
        self.stiffness() * self.strain
    }

    fn stiffness(&self) -> Mat2 {
        Mat2::new(self.e * self.area, 0.0, 0.0, self.e * self.inertia)
    }

    fn reset(&mut self) {
        self.strain = Vec2::zeros();
    }

    fn clone_box(&self) -> Box<dyn SectionMaterial> {
        Box::new(self.clone())
    }
}

/// A single fiber of a discretized cross-section
#[derive(Debug, Clone)]
pub struct Fiber {
    /// Distance from the reference axis
    pub y: f64,
    pub area: f64,
    pub material: Box<dyn UniaxialMaterial>,
}

/// Fiber section
///
/// Fiber strain follows plane sections, `ε(y) = ε - y κ`, so a positive
/// curvature compresses fibers above the axis. Resultants are
/// `N = Σ σ A` and `M = -Σ σ A y`.
#[derive(Debug, Clone)]
pub struct FiberSection {
    fibers: Vec<Fiber>,
    strain: Vec2,
}

impl FiberSection {
    pub fn new() -> Self {
        Self {
            fibers: Vec::new(),
            strain: Vec2::zeros(),
        }
    }

    pub fn add_fiber(&mut self, y: f64, area: f64, material: Box<dyn UniaxialMaterial>) {
        self.fibers.push(Fiber { y, area, material });
    }

    /// Rectangle of width `b` and depth `h` split into `layers` equal fibers
    pub fn rectangle(b: f64, h: f64, layers: usize, material: &dyn UniaxialMaterial) -> FemResult<Self> {
        if b <= 0.0 || h <= 0.0 || layers == 0 {
            return Err(FemError::InvalidMaterial(format!(
                "invalid rectangular fiber section (b={}, h={}, layers={})",
                b, h, layers
            )));
        }
        let dy = h / layers as f64;
        let mut section = Self::new();
        for i in 0..layers {
            let y = -h / 2.0 + (i as f64 + 0.5) * dy;
            section.add_fiber(y, b * dy, material.clone_box());
        }
        Ok(section)
    }

    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    /// Total area
    pub fn area(&self) -> f64 {
        self.fibers.iter().map(|f| f.area).sum()
    }
}

impl Default for FiberSection {
    fn default() -> Self {
        Self::new()
    }
}

impl SectionMaterial for FiberSection {
    fn set_strain(&mut self, strain: &Vec2) -> FemResult<()> {
        if self.fibers.is_empty() {
            return Err(FemError::InvalidMaterial("fiber section has no fibers".to_string()));
        }
        self.strain = *strain;
        for fiber in &mut self.fibers {
            fiber.material.set_strain(strain[0] - fiber.y * strain[1]);
        }
        Ok(())
    }

    fn strain(&self) -> Vec2 {
        self.strain
    }

    fn stress(&self) -> Vec2 {
        self.fibers.iter().fold(Vec2::zeros(), |acc, f| {
            let force = f.material.stress() * f.area;
            acc + Vec2::new(force, -force * f.y)
        })
    }

    fn stiffness(&self) -> Mat2 {
        self.fibers.iter().fold(Mat2::zeros(), |acc, f| {
            let ea = f.material.stiffness() * f.area;
            acc + Mat2::new(ea, -ea * f.y, -ea * f.y, ea * f.y * f.y)
        })
    }

    fn commit(&mut self) {
        for fiber in &mut self.fibers {
            fiber.material.commit();
        }
    }

    fn revert(&mut self) {
        for fiber in &mut self.fibers {
            fiber.material.revert();
        }
    }

    fn reset(&mut self) {
        for fiber in &mut self.fibers {
            fiber.material.reset();
        }
        self.strain = Vec2::zeros();
    }

    fn clone_box(&self) -> Box<dyn SectionMaterial> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materials::{ElasticMaterial, FiberMaterial};
    use approx::assert_relative_eq;

    #[test]
    fn test_elastic_fiber_section_matches_elastic_section() {
        let (e, b, h) = (1000.0, 0.2, 0.4);
        let mut fibers = FiberSection::rectangle(b, h, 200, &ElasticMaterial::new(e)).unwrap();
        let mut elastic = ElasticSection::rectangular(e, b, h).unwrap();

        let strain = Vec2::new(0.001, 0.02);
        fibers.set_strain(&strain).unwrap();
        elastic.set_strain(&strain).unwrap();

        assert_relative_eq!(fibers.stress()[0], elastic.stress()[0], max_relative = 1e-12);
        assert_relative_eq!(fibers.stress()[1], elastic.stress()[1], max_relative = 1e-4);
        assert_relative_eq!(fibers.stiffness()[(0, 1)], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_plastic_moment_of_rectangle() {
        let (b, h, fy) = (0.1, 0.2, 1.0);
        let steel = FiberMaterial::new(1000.0, fy, 0.0).unwrap();
        let mut section = FiberSection::rectangle(b, h, 400, &steel).unwrap();
        section.set_strain(&Vec2::new(0.0, 10.0)).unwrap();

        let mp = fy * b * h * h / 4.0;
        assert_relative_eq!(section.stress()[1], mp, max_relative = 1e-3);
        assert_relative_eq!(section.stress()[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_fiber_section_tangent() {
        let steel = FiberMaterial::new(1000.0, 1.0, 50.0).unwrap();
        let mut section = FiberSection::rectangle(0.1, 0.2, 20, &steel).unwrap();
        let strain = Vec2::new(0.0005, 0.015);
        section.set_strain(&strain).unwrap();
        let k = section.stiffness();

        let h = 1e-8;
        for j in 0..2 {
            let mut plus = strain;
            plus[j] += h;
            let mut minus = strain;
            minus[j] -= h;
            let mut perturbed = section.clone();
            perturbed.set_strain(&plus).unwrap();
            let sp = perturbed.stress();
            perturbed.set_strain(&minus).unwrap();
            let sm = perturbed.stress();
            let column = (sp - sm) / (2.0 * h);
            assert_relative_eq!(column[0], k[(0, j)], epsilon = 1e-5, max_relative = 1e-5);
            assert_relative_eq!(column[1], k[(1, j)], epsilon = 1e-5, max_relative = 1e-5);
        }
    }

    #[test]
    fn test_empty_section_rejected() {
        let mut section = FiberSection::new();
        assert!(section.set_strain(&Vec2::zeros()).is_err());
        assert!(ElasticSection::new(1.0, 0.0, 1.0).is_err());
    }
}
