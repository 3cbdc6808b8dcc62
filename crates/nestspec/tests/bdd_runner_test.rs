nestspec::bdd! {
    describe "Calculator" {
        it "adds two numbers" {
            ctx.expect_eq(2 + 3, 5)?;
        }

        it "multiplies" {
            ctx.expect_eq(3 * 4, 12)?;
        }

        context "with negative numbers" {
            it "handles negatives" {
                ctx.expect_eq(-1 + 3, 2)?;
            }
        }

        describe "Division" {
            it "divides evenly" {
                ctx.expect_eq(10 / 2, 5)?;
            }

            xit "handles division by zero" {
                ctx.fail("pending")?;
            }
        }
    }

    // Regression: values set by an outer `before` are visible in nested examples
    describe "Hook inheritance" {
        before {
            ctx.set("x", 42);
        }

        it "uses before at the same level" {
            ctx.expect_eq(ctx.get::<i32>("x").copied(), Some(42))?;
        }

        context "nested context" {
            before {
                let x = ctx.get::<i32>("x").copied().unwrap_or_default();
                ctx.set("y", x + 1);
            }

            it "inherits the outer before" {
                ctx.expect_eq(ctx.get::<i32>("x").copied(), Some(42))?;
                ctx.expect_eq(ctx.get::<i32>("y").copied(), Some(43))?;
            }
        }
    }

    describe "String operations" {
        before_all {
            ctx.set("greeting", String::from("hello"));
        }

        after {
            ctx.expect(ctx.contains("greeting"), "greeting survives every example")?;
        }

        it "has correct length" {
            let len = ctx.get::<String>("greeting").map(String::len);
            ctx.expect_eq(len, Some(5))?;
        }

        it "converts to uppercase" {
            let upper = ctx.get::<String>("greeting").map(|g| g.to_uppercase());
            ctx.expect_eq(upper, Some("HELLO".to_string()))?;
        }

        it "waits on a fix" skip("unicode casing is not settled") {
            ctx.fail("never runs")?;
        }
    }

    xdescribe "Parked" {
        before_all {
            ctx.fail("never runs")?;
        }

        it "is skipped with its group" {
            ctx.fail("never runs")?;
        }
    }
}
