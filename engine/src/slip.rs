use common::EnrolledCourse;

pub const PASSING_GRADE: f64 = 70.0;
pub const REGULAR_GRADE: f64 = 60.0;

/// Totals shown above the enrollment slip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlipStatistics {
    pub total_courses: usize,
    pub total_credits: u32,
    pub approved_credits: u32,
    pub graded_courses: usize,
    /// None until at least one course has a grade.
    pub average: Option<f64>,
    pub approved: usize,
    pub regular: usize,
    pub failed: usize,
    pub in_progress: usize,
}

impl SlipStatistics {
    pub fn from_courses(courses: &[EnrolledCourse]) -> Self {
        let mut stats = SlipStatistics {
            total_courses: courses.len(),
            ..Default::default()
        };
        let mut grade_sum = 0.0;

        for course in courses {
            let credits = course.grupo_materia.materia.creditos;
            stats.total_credits += credits;
            match course.nota {
                None => stats.in_progress += 1,
                Some(grade) => {
                    stats.graded_courses += 1;
                    grade_sum += grade;
                    if grade >= PASSING_GRADE {
                        stats.approved += 1;
                        stats.approved_credits += credits;
                    } else if grade >= REGULAR_GRADE {
                        stats.regular += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
            }
        }

        if stats.graded_courses > 0 {
            stats.average = Some(grade_sum / stats.graded_courses as f64);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course(sigla: &str, credits: u32, grade: Option<f64>) -> EnrolledCourse {
        serde_json::from_value(serde_json::json!({
            "id": sigla,
            "nota": grade,
            "grupoMateria": {"grupo": "SA", "materia": {
                "nombre": sigla, "creditos": credits, "sigla": sigla, "nivel": {"semestre": 2}
            }}
        }))
        .unwrap()
    }

    #[test]
    fn test_statistics() {
        let courses = vec![
            course("INF120", 5, Some(85.0)),
            course("MAT101", 4, Some(65.0)),
            course("FIS100", 6, Some(40.0)),
            course("INF220", 5, None),
        ];
        let stats = SlipStatistics::from_courses(&courses);

        assert_eq!(stats.total_courses, 4);
        assert_eq!(stats.total_credits, 20);
        assert_eq!(stats.approved_credits, 5);
        assert_eq!((stats.approved, stats.regular, stats.failed, stats.in_progress), (1, 1, 1, 1));
        assert!((stats.average.unwrap() - 63.333).abs() < 0.01);
    }

    #[test]
    fn test_no_grades_means_no_average() {
        let stats = SlipStatistics::from_courses(&[course("INF110", 5, None)]);
        assert_eq!(stats.average, None);
        assert_eq!(SlipStatistics::from_courses(&[]), SlipStatistics::default());
    }
}
