use super::*;
use approx::assert_relative_eq;
use std::thread;

fn weights() -> Param<f64> {
    Param::new(Matrix::new(2, 2, vec![1.0, 2.0, 3.0, 4.0]))
}

#[test]
fn test_acc_grad_allocates_then_sums() {
    let p = weights();
    assert!(!p.has_grad());
    p.acc_grad(&Matrix::full(2, 2, 0.5));
    p.acc_grad(&Matrix::full(2, 2, 0.25));
    let grad = p.grad().unwrap();
    assert_eq!(grad.shape(), (2, 2));
    for &g in grad.data() {
        assert_relative_eq!(g, 0.75);
    }
}

#[test]
fn test_acc_grad_ignored_without_requires_grad() {
    let p = weights().with_requires_grad(false);
    p.acc_grad(&Matrix::full(2, 2, 1.0));
    assert!(!p.has_grad());

    p.set_requires_grad(true);
    p.acc_grad(&Matrix::full(2, 2, 1.0));
    assert!(p.has_grad());
}

#[test]
#[should_panic(expected = "Shape mismatch during operation Param::acc_grad")]
fn test_acc_grad_shape_mismatch_panics() {
    weights().acc_grad(&Matrix::full(3, 1, 1.0));
}

#[test]
fn test_apply_delta_keeps_earlier_snapshots() {
    let p = weights();
    let before = p.value();
    p.apply_delta(&Matrix::full(2, 2, 1.0));
    assert_eq!(before.data(), &[1.0, 2.0, 3.0, 4.0]);
    assert_eq!(p.value().data(), &[0.0, 1.0, 2.0, 3.0]);
}

#[test]
fn test_replace_value_clears_grad_and_payload() {
    let p = weights().with_name("w");
    p.acc_grad(&Matrix::full(2, 2, 1.0));
    p.set_payload(Payload::new(1, vec![Matrix::zeros(2, 2)]));

    p.replace_value(Matrix::scalar(9.0));
    assert!(!p.has_grad());
    assert!(p.payload().is_none());
    assert_relative_eq!(p.scalar_value(), 9.0);
    assert_eq!(p.name(), Some("w"));
}

#[test]
fn test_payload_update_in_place() {
    let p = weights();
    let created = p.update_payload(|slot| {
        if slot.is_none() {
            *slot = Some(Payload::new(7, vec![Matrix::zeros(2, 2)]));
            return true;
        }
        false
    });
    assert!(created);
    p.update_payload(|slot| {
        if let Some(payload) = slot.as_mut() {
            payload.data[0].add_in_place(&Matrix::full(2, 2, 1.0));
        }
    });
    let payload = p.payload().unwrap();
    assert_eq!(payload.label, 7);
    assert_eq!(payload.data[0].data(), &[1.0; 4]);

    p.clear_payload();
    assert!(p.payload().is_none());
}

#[test]
fn test_name_and_kind_are_set_once() {
    let p = weights();
    assert_eq!(p.name(), None);
    assert_eq!(p.kind(), ParamKind::Undefined);
    assert!(p.init_name("first"));
    assert!(!p.init_name("second"));
    assert_eq!(p.name(), Some("first"));

    let b = Param::new(Matrix::<f64>::zeros(1, 1)).with_kind(ParamKind::Biases);
    assert!(!b.init_kind(ParamKind::Weights));
    assert_eq!(b.kind(), ParamKind::Biases);
}

#[test]
fn test_kind_from_tag() {
    assert_eq!(ParamKind::from_tag("Weights"), ParamKind::Weights);
    assert_eq!(ParamKind::from_tag("BIASES"), ParamKind::Biases);
    assert_eq!(ParamKind::from_tag("gamma"), ParamKind::Undefined);
    assert_eq!(ParamKind::Weights.to_string(), "weights");
}

#[test]
fn test_concurrent_accumulation() {
    let p = Param::new(Matrix::<f64>::zeros(3, 1));
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..100 {
                    p.acc_grad(&Matrix::full(3, 1, 1.0));
                }
            });
        }
    });
    for &g in p.grad().unwrap().data() {
        assert_relative_eq!(g, 800.0);
    }
}

#[test]
fn test_operand_view() {
    let p = weights();
    let operand: &dyn Operand<f64> = &p;
    assert!(operand.requires_grad());
    operand.acc_grad(&Matrix::full(2, 2, 2.0));
    assert_eq!(operand.grad().unwrap().data(), &[2.0; 4]);
    assert_eq!(operand.value().shape(), (2, 2));
}
